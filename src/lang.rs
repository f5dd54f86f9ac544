//! Language pairs, translation directions, and corpus splits.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DatagenError, Result};

/// Ordered `(source, target)` language pair, i.e. one translation direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LanguagePair {
    /// Source language tag.
    pub source: String,
    /// Target language tag.
    pub target: String,
}

impl LanguagePair {
    /// Creates a new direction from two language tags.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Returns the opposite direction.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self::new(self.target.clone(), self.source.clone())
    }

    /// Key identifying the direction, e.g. `en__it`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}__{}", self.source, self.target)
    }

    /// Key of the unordered pair: both tags sorted, naming the corpus directory.
    #[must_use]
    pub fn corpus_key(&self) -> String {
        if self.source <= self.target {
            self.key()
        } else {
            self.reversed().key()
        }
    }

    /// Returns this pair with its tags sorted lexicographically.
    #[must_use]
    pub fn unordered(&self) -> Self {
        if self.source <= self.target {
            self.clone()
        } else {
            self.reversed()
        }
    }

    /// Parses a comma separated list such as `en:it,it:en,en:fr`.
    pub fn parse_list(value: &str) -> Result<Vec<Self>> {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)
    }
}

impl FromStr for LanguagePair {
    type Err = DatagenError;

    fn from_str(value: &str) -> Result<Self> {
        let mut parts = value.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(source), Some(target), None) => {
                let (source, target) = (source.trim(), target.trim());
                if source.is_empty() || target.is_empty() {
                    return Err(DatagenError::InvalidConfig(format!(
                        "language pair {value:?} has an empty language tag"
                    )));
                }
                if source == target {
                    return Err(DatagenError::InvalidConfig(format!(
                        "language pair {value:?} uses the same language on both sides"
                    )));
                }
                Ok(Self::new(source, target))
            }
            _ => Err(DatagenError::InvalidConfig(format!(
                "language pair {value:?} must look like <source>:<target>"
            ))),
        }
    }
}

/// Distinct target languages across the requested directions, sorted.
pub fn target_languages(pairs: &[LanguagePair]) -> BTreeSet<&str> {
    pairs.iter().map(|pair| pair.target.as_str()).collect()
}

/// Distinct unordered pairs across the requested directions, in first-seen order.
pub fn unordered_pairs(pairs: &[LanguagePair]) -> Vec<LanguagePair> {
    let mut seen = BTreeSet::new();
    pairs
        .iter()
        .map(LanguagePair::unordered)
        .filter(|pair| seen.insert(pair.key()))
        .collect()
}

/// Corpus split; decides which output streams receive a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorpusSplit {
    /// Training data.
    Train,
    /// Validation data.
    Dev,
}

impl CorpusSplit {
    /// Both splits in processing order.
    pub const ALL: [CorpusSplit; 2] = [CorpusSplit::Train, CorpusSplit::Dev];

    /// Directory and output file prefix used for the split.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Dev => "dev",
        }
    }
}

impl fmt::Display for CorpusSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
