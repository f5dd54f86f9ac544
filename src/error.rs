//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::Stage;

/// Convenient result type used throughout the crate.
pub type Result<T, E = DatagenError> = std::result::Result<T, E>;

/// Domain-specific error describing failures while preparing training data.
#[derive(Debug, Error)]
pub enum DatagenError {
    /// Configuration or input shape failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Source, target, and factor streams of a direction do not line up.
    #[error("alignment error in {direction} ({split}): {message}")]
    Alignment {
        /// Direction key such as `en__it`.
        direction: String,
        /// Corpus split being processed.
        split: String,
        /// Description of the mismatch.
        message: String,
    },
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
    /// Error bubbled up from the `tokenizers` crate.
    #[error("huggingface tokenizers error: {0}")]
    Tokenizers(String),
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A statistic was requested from an accumulator holding no samples.
    #[error("division by zero: statistics requested over an empty sequence")]
    DivideByZero,
    /// The external dataset builder could not be run or reported failure.
    #[error("external tool `{program}` failed: {message}")]
    ExternalTool {
        /// Program that was invoked.
        program: String,
        /// Exit status or spawn failure description.
        message: String,
    },
    /// A pipeline stage failed; the stage stays pending in the checkpoint store.
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        /// Stage that raised the error.
        stage: Stage,
        /// Error raised inside the stage.
        #[source]
        source: Box<DatagenError>,
    },
    /// Catch-all variant for invariants that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokenizers::Error> for DatagenError {
    fn from(err: tokenizers::Error) -> Self {
        Self::Tokenizers(err.to_string())
    }
}

impl From<serde_json::Error> for DatagenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl DatagenError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }

    /// Builds an [`DatagenError::Alignment`] for the given direction and split.
    pub fn alignment(
        direction: impl Into<String>,
        split: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Alignment {
            direction: direction.into(),
            split: split.into(),
            message: message.into(),
        }
    }

    /// Returns the failing stage when the error was raised inside the pipeline.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
