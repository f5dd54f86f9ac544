//! Configuration builder controlling a data generation run.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{DatagenError, Result};
use crate::lang::LanguagePair;
use crate::pipeline::Stage;

/// Default vocabulary size.
pub const DEFAULT_VOCAB_SIZE: usize = 32_768;
/// Lines handed to the worker pool per batch, per worker.
pub const BATCH_LINES_PER_WORKER: usize = 100;

/// Options for one data generation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatagenConfig {
    /// Requested translation directions.
    pub lang_pairs: Vec<LanguagePair>,
    /// Corpus roots, each holding `<a>__<b>/{train,dev}` directories.
    pub input_paths: Vec<PathBuf>,
    /// Destination of the vocabulary, length statistics, and binarized dataset.
    pub output_path: PathBuf,
    /// Directory holding checkpoints and intermediate files; `None` uses a temp directory.
    pub working_dir: Option<PathBuf>,
    /// Keeps the working directory after a successful run.
    pub keep_working_dir: bool,
    /// Target vocabulary size.
    pub vocab_size: usize,
    /// Threads used while training the vocabulary.
    pub vocab_threads: usize,
    /// Minimum pair count for a merge during vocabulary training.
    pub count_threshold: Option<u64>,
    /// Pre-built vocabulary copied instead of training a new one.
    pub vocabulary_path: Option<PathBuf>,
    /// Task identifier forwarded to the dataset builder.
    pub task: Option<String>,
    /// Tells the dataset builder that factor streams are meaningful.
    pub with_factors: bool,
    /// Tokenization worker threads.
    pub workers: usize,
    /// Aligned lines per batch; `None` derives it from `workers`.
    pub batch_size: Option<usize>,
    /// Forces re-execution starting at this stage.
    pub start_stage: Option<Stage>,
}

impl DatagenConfig {
    /// Returns a builder for the required arguments.
    #[must_use]
    pub fn builder(
        lang_pairs: Vec<LanguagePair>,
        input_paths: Vec<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> DatagenBuilder {
        DatagenBuilder::new(lang_pairs, input_paths, output_path)
    }

    /// Validates the invariants required before any stage runs.
    pub fn validate(&self) -> Result<()> {
        if self.lang_pairs.is_empty() {
            return Err(DatagenError::InvalidConfig(
                "at least one language pair is required".into(),
            ));
        }
        if self.input_paths.is_empty() {
            return Err(DatagenError::InvalidConfig(
                "at least one input path is required".into(),
            ));
        }
        if self.keep_working_dir && self.working_dir.is_none() {
            return Err(DatagenError::InvalidConfig(
                "keeping the working directory requires an explicit working directory".into(),
            ));
        }
        if self.vocabulary_path.is_none() && self.vocab_size == 0 {
            return Err(DatagenError::InvalidConfig(
                "vocab_size must be greater than zero".into(),
            ));
        }
        if self.workers == 0 {
            return Err(DatagenError::InvalidConfig(
                "workers must be greater than zero".into(),
            ));
        }
        if self.batch_size == Some(0) {
            return Err(DatagenError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        let working_dir = lexical_absolute(&self.effective_working_dir());
        let output_path = lexical_absolute(&self.output_path);
        if working_dir.starts_with(&output_path) || output_path.starts_with(&working_dir) {
            return Err(DatagenError::InvalidConfig(format!(
                "working directory {working_dir:?} and output {output_path:?} must not contain each other"
            )));
        }
        if let Some(path) = &self.vocabulary_path {
            if !path.is_file() {
                return Err(DatagenError::InvalidConfig(format!(
                    "vocabulary {path:?} does not exist"
                )));
            }
        }
        Ok(())
    }

    /// Aligned lines per batch.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size
            .unwrap_or(self.workers * BATCH_LINES_PER_WORKER)
    }

    /// Working directory, falling back to a per-process temp directory.
    #[must_use]
    pub fn effective_working_dir(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join(format!("nmt-datagen-{}", std::process::id())),
        }
    }

    /// Options that determine the outputs; a stored run only resumes when these match.
    #[must_use]
    pub fn fingerprint(&self) -> serde_json::Value {
        json!({
            "lang_pairs": self.lang_pairs,
            "input_paths": self.input_paths,
            "output_path": self.output_path,
            "vocab_size": self.vocab_size,
            "count_threshold": self.count_threshold,
            "vocabulary_path": self.vocabulary_path,
            "task": self.task,
            "with_factors": self.with_factors,
        })
    }
}

/// Absolute form of `path` with `.` and `..` resolved without touching the filesystem.
fn lexical_absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Number of threads the machine can run in parallel.
#[must_use]
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1)
}

/// Builder for [`DatagenConfig`].
#[derive(Debug, Clone)]
pub struct DatagenBuilder {
    cfg: DatagenConfig,
}

impl DatagenBuilder {
    /// Creates a builder with default options for the required arguments.
    #[must_use]
    pub fn new(
        lang_pairs: Vec<LanguagePair>,
        input_paths: Vec<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cfg: DatagenConfig {
                lang_pairs,
                input_paths,
                output_path: output_path.into(),
                working_dir: None,
                keep_working_dir: false,
                vocab_size: DEFAULT_VOCAB_SIZE,
                vocab_threads: 2,
                count_threshold: None,
                vocabulary_path: None,
                task: None,
                with_factors: false,
                workers: available_workers(),
                batch_size: None,
                start_stage: None,
            },
        }
    }

    /// Sets the working directory used for checkpoints and intermediate files.
    #[must_use]
    pub fn working_dir(mut self, dir: Option<impl AsRef<Path>>) -> Self {
        self.cfg.working_dir = dir.map(|dir| dir.as_ref().to_path_buf());
        self
    }

    /// Keeps the working directory after a successful run.
    #[must_use]
    pub fn keep_working_dir(mut self, keep: bool) -> Self {
        self.cfg.keep_working_dir = keep;
        self
    }

    /// Sets the target vocabulary size.
    #[must_use]
    pub fn vocab_size(mut self, size: usize) -> Self {
        self.cfg.vocab_size = size;
        self
    }

    /// Sets the number of threads used for vocabulary training.
    #[must_use]
    pub fn vocab_threads(mut self, threads: usize) -> Self {
        self.cfg.vocab_threads = threads;
        self
    }

    /// Sets the minimum pair count for merges.
    #[must_use]
    pub fn count_threshold(mut self, threshold: Option<u64>) -> Self {
        self.cfg.count_threshold = threshold;
        self
    }

    /// Reuses an existing vocabulary instead of training one.
    #[must_use]
    pub fn vocabulary_path(mut self, path: Option<impl AsRef<Path>>) -> Self {
        self.cfg.vocabulary_path = path.map(|path| path.as_ref().to_path_buf());
        self
    }

    /// Sets the task identifier forwarded to the dataset builder.
    #[must_use]
    pub fn task(mut self, task: Option<impl Into<String>>) -> Self {
        self.cfg.task = task.map(Into::into);
        self
    }

    /// Marks factor streams as meaningful for the dataset builder.
    #[must_use]
    pub fn with_factors(mut self, enabled: bool) -> Self {
        self.cfg.with_factors = enabled;
        self
    }

    /// Sets the number of tokenization workers.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.cfg.workers = workers;
        self
    }

    /// Overrides the batch size.
    #[must_use]
    pub fn batch_size(mut self, size: Option<usize>) -> Self {
        self.cfg.batch_size = size;
        self
    }

    /// Forces execution to restart at `stage`.
    #[must_use]
    pub fn start_stage(mut self, stage: Option<Stage>) -> Self {
        self.cfg.start_stage = stage;
        self
    }

    /// Finalises the builder, returning a validated [`DatagenConfig`].
    pub fn build(self) -> Result<DatagenConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
