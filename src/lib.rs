//! Resumable data preparation for neural machine translation training.
//!
//! The crate exposes both a library API and an `nmt-datagen` command line interface. A run
//! trains (or copies) a shared subword vocabulary, tokenizes every requested translation
//! direction into aligned `train`/`dev` streams while collecting length-ratio statistics, and
//! hands the streams to an external binarizer. Each of the three stages is checkpointed in a
//! working directory so an interrupted run picks up where it stopped.
//!
//! ```no_run
//! use nmt_datagen::{
//!     DatagenConfig, LanguagePair, Pipeline, PreprocessCommand, SubwordVocabularyBuilder,
//! };
//!
//! # fn main() -> nmt_datagen::Result<()> {
//! let cfg = DatagenConfig::builder(
//!     LanguagePair::parse_list("en:it,it:en")?,
//!     vec!["/data/corpora".into()],
//!     "/data/out",
//! )
//! .working_dir(Some("/data/wdir"))
//! .build()?;
//! let vocabulary = SubwordVocabularyBuilder::from_config(&cfg);
//! let dataset = PreprocessCommand::default();
//! let report = Pipeline::new(cfg, &vocabulary, &dataset).run()?;
//! println!("vocabulary written to {}", report.vocabulary.display());
//! # Ok(())
//! # }
//! ```
//!
//! The CLI is enabled by default through the `cli` feature. Users targeting the library
//! portion only can disable default features to avoid the CLI dependencies:
//! `nmt-datagen = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod corpus;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod lang;
pub mod metrics;
pub mod persist;
pub mod pipeline;
pub mod stats;
pub mod subword;
pub mod tokenizer;
pub mod vocabulary;

pub use config::{DatagenBuilder, DatagenConfig};
pub use corpus::{AlignedFileSet, AlignedLineTuple};
pub use dataset::{DatasetBuilder, DatasetRequest, PreprocessCommand};
pub use encoder::{CorpusEncoder, EncodedCorpora};
pub use error::{DatagenError, Result};
pub use lang::{CorpusSplit, LanguagePair};
pub use metrics::{EncodingMetrics, SplitMetrics};
pub use pipeline::{Pipeline, PipelineReport, PipelineState, Stage};
pub use stats::{LengthEstimate, LengthStatistics, RunningStats};
pub use subword::{SubwordVocabulary, SubwordVocabularyBuilder};
pub use tokenizer::{ParallelTokenizer, TokenizedLineTuple};
pub use vocabulary::{Vocabulary, VocabularyBuilder};
