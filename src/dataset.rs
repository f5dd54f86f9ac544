//! Hand-off to the external tool that binarizes the encoded corpora.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use log::{debug, info};

use crate::encoder::{SOURCE_EXTENSION, TARGET_EXTENSION};
use crate::error::{DatagenError, Result};

/// Program invoked by [`PreprocessCommand::default`].
pub const DEFAULT_PREPROCESS_PROGRAM: &str = "fairseq-preprocess";

/// Binarized training source stream written by the preprocessing tool.
pub const ARCHIVE_FILE: &str = "train.sl-tl.sl.bin";

/// Everything the dataset builder needs to know about an encoded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRequest {
    /// Path prefix of the training streams (`<prefix>.sl`, `<prefix>.tl`, `<prefix>.factor`).
    pub train_prefix: PathBuf,
    /// Path prefix of the validation streams.
    pub valid_prefix: PathBuf,
    /// Directory receiving the binarized dataset.
    pub destination: PathBuf,
    /// Worker-count hint.
    pub workers: usize,
    /// Joined source/target dictionary.
    pub dictionary: PathBuf,
    /// Whether the factor streams carry annotations.
    pub with_factors: bool,
    /// Optional task identifier.
    pub task: Option<String>,
}

impl DatasetRequest {
    /// Command line arguments describing the request.
    #[must_use]
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--source-lang".into(),
            SOURCE_EXTENSION.into(),
            "--target-lang".into(),
            TARGET_EXTENSION.into(),
            "--trainpref".into(),
            self.train_prefix.clone().into(),
            "--validpref".into(),
            self.valid_prefix.clone().into(),
            "--destdir".into(),
            self.destination.clone().into(),
            "--workers".into(),
            self.workers.to_string().into(),
            "--srcdict".into(),
            self.dictionary.clone().into(),
            "--joined-dictionary".into(),
            "--dataset-impl".into(),
            "mmap".into(),
        ];
        if self.with_factors {
            args.push("--with-factors".into());
        }
        if let Some(task) = &self.task {
            args.push("--task".into());
            args.push(task.into());
        }
        args
    }
}

/// Turns encoded corpora into the final training archive.
pub trait DatasetBuilder: Send + Sync {
    /// Builds the archive described by `request`.
    fn build(&self, request: &DatasetRequest) -> Result<()>;

    /// File whose presence shows the archive for `request` was built.
    fn archive(&self, request: &DatasetRequest) -> PathBuf;
}

/// Runs an external preprocessing program and waits for it to exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessCommand {
    program: OsString,
    extra_args: Vec<OsString>,
}

impl PreprocessCommand {
    /// Invokes `program` with the request's arguments.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Appends arguments placed after the request's own.
    #[must_use]
    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program name.
    #[must_use]
    pub fn program(&self) -> &OsString {
        &self.program
    }

    fn failure(&self, message: impl Into<String>) -> DatagenError {
        DatagenError::ExternalTool {
            program: self.program.to_string_lossy().into_owned(),
            message: message.into(),
        }
    }
}

impl Default for PreprocessCommand {
    fn default() -> Self {
        Self::new(DEFAULT_PREPROCESS_PROGRAM)
    }
}

impl DatasetBuilder for PreprocessCommand {
    fn build(&self, request: &DatasetRequest) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.args(request.to_args()).args(&self.extra_args);
        debug!("running {command:?}");
        info!(
            "building dataset in {} with {}",
            request.destination.display(),
            self.program.to_string_lossy()
        );

        let status = command
            .status()
            .map_err(|err| self.failure(format!("could not be started: {err}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(self.failure(format!("exited with {status}")))
        }
    }

    fn archive(&self, request: &DatasetRequest) -> PathBuf {
        request.destination.join(ARCHIVE_FILE)
    }
}
