//! Capability interfaces for the subword vocabulary and its special tokens.
//!
//! The pipeline never looks inside a vocabulary: it trains or copies an artifact through a
//! [`VocabularyBuilder`], loads it once, and tokenizes through the [`Vocabulary`] trait.
//! [`crate::subword`] provides the Hugging Face backed implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

/// Factor assigned to tokens that carry no annotation, including injected language tags.
pub const DEFAULT_FACTOR: &str = "<none>";

/// Number of do-not-translate placeholders reserved in every vocabulary.
pub const DNT_PLACEHOLDERS: usize = 10;

/// Tokenization operations the encoding stage relies on.
pub trait Vocabulary: Send + Sync {
    /// Splits `text` into subword tokens.
    fn tokenize(&self, text: &str) -> Result<Vec<String>>;

    /// Splits `text` into subword tokens and returns one factor per token, taken from the
    /// whitespace-separated `factors` annotating each word of `text`.
    fn tokenize_with_factors(&self, text: &str, factors: &str)
        -> Result<(Vec<String>, Vec<String>)>;
}

/// Produces and restores vocabulary artifacts.
pub trait VocabularyBuilder: Send + Sync {
    /// Trains a vocabulary over `files` and writes the artifact to `destination`.
    fn build(&self, files: &[PathBuf], custom_tokens: &[String], destination: &Path)
        -> Result<()>;

    /// Loads an artifact previously written by [`VocabularyBuilder::build`].
    fn load(&self, path: &Path) -> Result<Arc<dyn Vocabulary>>;
}

/// Token prefixed to source sentences to select the target language.
#[must_use]
pub fn language_tag(lang: &str) -> String {
    format!("__{lang}__")
}

/// Custom tokens reserved in the vocabulary: language tags (only for multi-target runs)
/// followed by the do-not-translate placeholders.
pub fn custom_tokens<'a, I>(target_languages: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let targets: Vec<&str> = target_languages.into_iter().collect();
    let mut tokens = Vec::with_capacity(targets.len() + DNT_PLACEHOLDERS);
    if targets.len() > 1 {
        tokens.extend(targets.into_iter().map(language_tag));
    }
    tokens.extend((0..DNT_PLACEHOLDERS).map(|idx| format!("${{DNT{idx}}}")));
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_target_reserves_only_placeholders() {
        let tokens = custom_tokens(["it"]);
        assert_eq!(tokens.len(), DNT_PLACEHOLDERS);
        assert_eq!(tokens[0], "${DNT0}");
        assert_eq!(tokens[9], "${DNT9}");
    }

    #[test]
    fn multiple_targets_prepend_language_tags() {
        let tokens = custom_tokens(["fr", "it"]);
        assert_eq!(&tokens[..2], &["__fr__".to_string(), "__it__".to_string()]);
        assert_eq!(tokens.len(), 2 + DNT_PLACEHOLDERS);
    }
}
