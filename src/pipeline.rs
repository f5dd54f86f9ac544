//! Checkpointed three-stage controller: vocabulary, encoding, dataset generation.
//!
//! Progress lives in `<working dir>/state.json`. A stage recorded there is skipped on the next
//! invocation as long as the artifacts it declared still exist, so a failed or interrupted run
//! resumes at the stage that did not finish. Every artifact is written under a temporary name and
//! renamed into place before its stage is recorded.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::DatagenConfig;
use crate::corpus::vocabulary_files;
use crate::dataset::{DatasetBuilder, DatasetRequest};
use crate::encoder::{output_prefix, CorpusEncoder};
use crate::error::{DatagenError, Result};
use crate::lang::{target_languages, unordered_pairs, CorpusSplit};
use crate::metrics::EncodingMetrics;
use crate::persist::{copy_atomic, fresh_dir, replace_dir, staging_path, write_atomic};
use crate::tokenizer::ParallelTokenizer;
use crate::vocabulary::{custom_tokens, VocabularyBuilder};

/// Checkpoint file inside the working directory.
pub const STATE_FILE: &str = "state.json";
/// Vocabulary artifact inside the output directory.
pub const VOCABULARY_FILE: &str = "model.vcb";
/// Length statistics inside the output directory.
pub const LENGTHS_FILE: &str = "decode_lengths.json";
/// Encoded corpora directory inside the working directory.
pub const ENCODED_DIR: &str = "encoded_corpora";

const VOCABULARY_KEY: &str = "vocabulary";
const ENCODED_KEY: &str = "encoded_corpora";
const LENGTHS_KEY: &str = "decode_lengths";
const DATASET_KEY: &str = "dataset";

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Train or copy the subword vocabulary.
    Vocabulary,
    /// Tokenize every requested direction into the aligned streams.
    Encode,
    /// Hand the encoded streams to the dataset builder.
    Datagen,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Vocabulary, Stage::Encode, Stage::Datagen];

    /// Stable identifier used in the checkpoint file and on the command line.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Stage::Vocabulary => "vocabulary",
            Stage::Encode => "encode",
            Stage::Datagen => "datagen",
        }
    }

    /// Human readable summary used in progress messages.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Stage::Vocabulary => "creating vocabulary",
            Stage::Encode => "encoding corpora",
            Stage::Datagen => "generating binary dataset",
        }
    }

    /// Keys of the values this stage records.
    fn outputs(self) -> &'static [&'static str] {
        match self {
            Stage::Vocabulary => &[VOCABULARY_KEY],
            Stage::Encode => &[ENCODED_KEY, LENGTHS_KEY],
            Stage::Datagen => &[DATASET_KEY],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = DatagenError;

    fn from_str(value: &str) -> Result<Self> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                DatagenError::InvalidConfig(format!(
                    "unknown stage `{value}`; expected one of vocabulary, encode, datagen"
                ))
            })
    }
}

/// Persisted progress of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Options the state was produced with.
    pub fingerprint: serde_json::Value,
    /// Stages that finished, in execution order.
    pub completed: Vec<Stage>,
    /// Artifacts recorded by completed stages.
    pub values: BTreeMap<String, PathBuf>,
}

impl PipelineState {
    /// Fresh state for a run with the given fingerprint.
    #[must_use]
    pub fn new(fingerprint: serde_json::Value) -> Self {
        Self {
            fingerprint,
            completed: Vec::new(),
            values: BTreeMap::new(),
        }
    }

    /// Reads a checkpoint file, returning `None` when it does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let text =
            fs::read_to_string(path).map_err(|err| DatagenError::io(err, Some(path.into())))?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Writes the checkpoint atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    /// Returns true when `stage` finished in a previous invocation.
    #[must_use]
    pub fn is_completed(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }

    /// Path recorded under `key`.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Path> {
        self.values.get(key).map(PathBuf::as_path)
    }

    /// Returns true when every artifact `stage` declared is still on disk.
    #[must_use]
    pub fn outputs_exist(&self, stage: Stage) -> bool {
        stage
            .outputs()
            .iter()
            .all(|key| self.value(key).is_some_and(Path::exists))
    }

    /// Records `stage` as completed with its artifacts.
    pub fn mark_completed(&mut self, stage: Stage, outputs: Vec<(&str, PathBuf)>) {
        for (key, path) in outputs {
            self.values.insert(key.to_owned(), path);
        }
        if !self.is_completed(stage) {
            self.completed.push(stage);
        }
    }

    /// Forgets `stage` and every stage after it.
    pub fn invalidate_from(&mut self, stage: Stage) {
        self.completed.retain(|done| *done < stage);
        for later in Stage::ALL.into_iter().filter(|later| *later >= stage) {
            for key in later.outputs() {
                self.values.remove(*key);
            }
        }
    }
}

/// Summary of a pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Stages run by this invocation.
    pub executed: Vec<Stage>,
    /// Stages skipped because a previous invocation completed them.
    pub skipped: Vec<Stage>,
    /// Vocabulary artifact.
    pub vocabulary: PathBuf,
    /// Length statistics artifact.
    pub lengths: PathBuf,
    /// Directory holding the final dataset.
    pub output_path: PathBuf,
    /// Encoding counters when the encode stage ran.
    pub metrics: Option<EncodingMetrics>,
}

/// Drives the stages of a run against a working directory.
pub struct Pipeline<'a> {
    cfg: DatagenConfig,
    vocabulary: &'a dyn VocabularyBuilder,
    dataset: &'a dyn DatasetBuilder,
    working_dir: PathBuf,
}

impl<'a> Pipeline<'a> {
    /// Creates a controller using the given collaborators.
    #[must_use]
    pub fn new(
        cfg: DatagenConfig,
        vocabulary: &'a dyn VocabularyBuilder,
        dataset: &'a dyn DatasetBuilder,
    ) -> Self {
        let working_dir = cfg.effective_working_dir();
        Self {
            cfg,
            vocabulary,
            dataset,
            working_dir,
        }
    }

    /// Configuration of the run.
    #[must_use]
    pub fn config(&self) -> &DatagenConfig {
        &self.cfg
    }

    /// Directory holding the checkpoint and intermediate files.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Runs every stage that is not already complete.
    pub fn run(&self) -> Result<PipelineReport> {
        self.cfg.validate()?;
        fs::create_dir_all(&self.working_dir)
            .map_err(|err| DatagenError::io(err, Some(self.working_dir.clone())))?;

        let state_path = self.working_dir.join(STATE_FILE);
        let mut state = self.restore_state(&state_path)?;
        if let Some(stage) = self.cfg.start_stage {
            info!("restarting from stage {stage}");
            state.invalidate_from(stage);
        }

        let mut report = PipelineReport {
            executed: Vec::new(),
            skipped: Vec::new(),
            vocabulary: self.cfg.output_path.join(VOCABULARY_FILE),
            lengths: self.cfg.output_path.join(LENGTHS_FILE),
            output_path: self.cfg.output_path.clone(),
            metrics: None,
        };

        for stage in Stage::ALL {
            if state.is_completed(stage) {
                if state.outputs_exist(stage) {
                    info!("stage {stage} already completed, skipping");
                    report.skipped.push(stage);
                    continue;
                }
                warn!("stage {stage} was completed but its outputs are missing; running it again");
                state.invalidate_from(stage);
            }

            info!("stage {stage}: {}", stage.description());
            let start = Instant::now();
            let wrap = |source: DatagenError| DatagenError::Stage {
                stage,
                source: Box::new(source),
            };
            let outputs = self.execute(stage, &state, &mut report).map_err(wrap)?;
            state.mark_completed(stage, outputs);
            state.save(&state_path).map_err(wrap)?;
            info!("stage {stage} completed in {:.2?}", start.elapsed());
            report.executed.push(stage);
        }

        if self.cfg.keep_working_dir {
            info!("keeping working directory {}", self.working_dir.display());
        } else {
            fs::remove_dir_all(&self.working_dir)
                .map_err(|err| DatagenError::io(err, Some(self.working_dir.clone())))?;
        }
        Ok(report)
    }

    fn restore_state(&self, path: &Path) -> Result<PipelineState> {
        let fingerprint = self.cfg.fingerprint();
        match PipelineState::load(path)? {
            Some(state) if state.fingerprint == fingerprint => {
                if !state.completed.is_empty() {
                    info!(
                        "resuming run in {} ({} stages completed)",
                        self.working_dir.display(),
                        state.completed.len()
                    );
                }
                Ok(state)
            }
            Some(_) => {
                warn!(
                    "{} holds the state of a different run; starting over",
                    self.working_dir.display()
                );
                Ok(PipelineState::new(fingerprint))
            }
            None => Ok(PipelineState::new(fingerprint)),
        }
    }

    fn execute(
        &self,
        stage: Stage,
        state: &PipelineState,
        report: &mut PipelineReport,
    ) -> Result<Vec<(&'static str, PathBuf)>> {
        match stage {
            Stage::Vocabulary => self.create_vocabulary(),
            Stage::Encode => self.encode_corpora(state, report),
            Stage::Datagen => self.generate_dataset(state),
        }
    }

    fn create_vocabulary(&self) -> Result<Vec<(&'static str, PathBuf)>> {
        let destination = self.cfg.output_path.join(VOCABULARY_FILE);
        if let Some(source) = &self.cfg.vocabulary_path {
            info!("copying vocabulary from {}", source.display());
            copy_atomic(source, &destination)?;
        } else {
            let pairs = unordered_pairs(&self.cfg.lang_pairs);
            let files = vocabulary_files(&pairs, &self.cfg.input_paths)?;
            if files.is_empty() {
                return Err(DatagenError::InvalidConfig(
                    "no corpus files found to train the vocabulary".into(),
                ));
            }
            let tokens = custom_tokens(target_languages(&self.cfg.lang_pairs));
            info!(
                "training vocabulary of {} entries on {} files",
                self.cfg.vocab_size,
                files.len()
            );
            self.vocabulary.build(&files, &tokens, &destination)?;
        }
        Ok(vec![(VOCABULARY_KEY, destination)])
    }

    fn encode_corpora(
        &self,
        state: &PipelineState,
        report: &mut PipelineReport,
    ) -> Result<Vec<(&'static str, PathBuf)>> {
        let vocabulary = required(state, VOCABULARY_KEY)?;
        let tokenizer = ParallelTokenizer::initialize(self.vocabulary, vocabulary, self.cfg.workers)?;

        let encoded = self.working_dir.join(ENCODED_DIR);
        let partial = staging_path(&encoded, "partial");
        fresh_dir(&partial)?;
        let result = CorpusEncoder::new(&tokenizer, self.cfg.effective_batch_size()).encode(
            &self.cfg.lang_pairs,
            &self.cfg.input_paths,
            &partial,
        )?;
        replace_dir(&partial, &encoded)?;

        let lengths = self.cfg.output_path.join(LENGTHS_FILE);
        result.lengths.save(&lengths)?;
        report.metrics = Some(result.metrics);
        Ok(vec![(ENCODED_KEY, encoded), (LENGTHS_KEY, lengths)])
    }

    fn generate_dataset(&self, state: &PipelineState) -> Result<Vec<(&'static str, PathBuf)>> {
        let encoded = required(state, ENCODED_KEY)?;
        let destination = self.cfg.output_path.clone();
        fs::create_dir_all(&destination)
            .map_err(|err| DatagenError::io(err, Some(destination.clone())))?;
        let request = DatasetRequest {
            train_prefix: output_prefix(encoded, CorpusSplit::Train),
            valid_prefix: output_prefix(encoded, CorpusSplit::Dev),
            destination: destination.clone(),
            workers: self.cfg.workers,
            dictionary: required(state, VOCABULARY_KEY)?.to_path_buf(),
            with_factors: self.cfg.with_factors,
            task: self.cfg.task.clone(),
        };
        self.dataset.build(&request)?;
        let archive = self.dataset.archive(&request);
        if !archive.exists() {
            warn!(
                "dataset builder finished without producing {}; the datagen stage will run again next time",
                archive.display()
            );
        }
        Ok(vec![(DATASET_KEY, archive)])
    }
}

fn required<'s>(state: &'s PipelineState, key: &str) -> Result<&'s Path> {
    state
        .value(key)
        .ok_or_else(|| DatagenError::Internal(format!("checkpoint has no `{key}` entry")))
}
