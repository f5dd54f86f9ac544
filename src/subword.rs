//! Hugging Face `tokenizers` backend for the vocabulary interfaces.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use rayon::ThreadPoolBuilder;
use tokenizers::models::bpe::{BpeTrainerBuilder, BPE};
use tokenizers::models::{ModelWrapper, TrainerWrapper};
use tokenizers::pre_tokenizers::whitespace::WhitespaceSplit;
use tokenizers::{AddedToken, Tokenizer};

use crate::config::DatagenConfig;
use crate::error::{DatagenError, Result};
use crate::persist::write_atomic;
use crate::vocabulary::{Vocabulary, VocabularyBuilder, DEFAULT_FACTOR};

/// Marker carried by subwords that continue a word.
pub const SUBWORD_PREFIX: &str = "@@";

/// Trains whitespace-split BPE vocabularies and stores them as tokenizer JSON.
#[derive(Debug, Clone)]
pub struct SubwordVocabularyBuilder {
    vocab_size: usize,
    min_frequency: u64,
    threads: usize,
}

impl SubwordVocabularyBuilder {
    /// Creates a builder targeting `vocab_size` entries trained on `threads` threads.
    #[must_use]
    pub fn new(vocab_size: usize, threads: usize) -> Self {
        Self {
            vocab_size,
            min_frequency: 0,
            threads: threads.max(1),
        }
    }

    /// Pairs rarer than `count` are never merged.
    #[must_use]
    pub fn min_frequency(mut self, count: u64) -> Self {
        self.min_frequency = count;
        self
    }

    /// Builder matching the vocabulary options of a pipeline configuration.
    #[must_use]
    pub fn from_config(cfg: &DatagenConfig) -> Self {
        Self::new(cfg.vocab_size, cfg.vocab_threads).min_frequency(cfg.count_threshold.unwrap_or(0))
    }
}

impl VocabularyBuilder for SubwordVocabularyBuilder {
    fn build(
        &self,
        files: &[PathBuf],
        custom_tokens: &[String],
        destination: &Path,
    ) -> Result<()> {
        if files.is_empty() {
            return Err(DatagenError::InvalidConfig(
                "no corpus files available to train the vocabulary".into(),
            ));
        }

        let model = BPE::builder()
            .continuing_subword_prefix(SUBWORD_PREFIX.into())
            .build()?;
        let mut tokenizer = Tokenizer::new(ModelWrapper::BPE(model));
        tokenizer.with_pre_tokenizer(Some(WhitespaceSplit));

        let special_tokens = custom_tokens
            .iter()
            .map(|token| AddedToken::from(token.clone(), true))
            .collect::<Vec<_>>();
        let trainer = BpeTrainerBuilder::new()
            .show_progress(false)
            .vocab_size(self.vocab_size)
            .min_frequency(self.min_frequency)
            .special_tokens(special_tokens)
            .continuing_subword_prefix(SUBWORD_PREFIX.into())
            .build();
        let mut trainer = TrainerWrapper::from(trainer);

        let inputs = files
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        info!(
            "training subword vocabulary: files={} target_size={} threads={}",
            inputs.len(),
            self.vocab_size,
            self.threads
        );
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|err| DatagenError::Internal(err.to_string()))?;
        pool.install(|| tokenizer.train_from_files(&mut trainer, inputs).map(|_| ()))?;
        info!(
            "trained vocabulary with {} entries",
            tokenizer.get_vocab_size(true)
        );

        let json = tokenizer.to_string(false)?;
        write_atomic(destination, json.as_bytes())
    }

    fn load(&self, path: &Path) -> Result<Arc<dyn Vocabulary>> {
        Ok(Arc::new(SubwordVocabulary::from_file(path)?))
    }
}

/// Read-only vocabulary backed by a Hugging Face [`Tokenizer`].
#[derive(Debug, Clone)]
pub struct SubwordVocabulary {
    inner: Tokenizer,
}

impl SubwordVocabulary {
    /// Wraps an already loaded tokenizer.
    #[must_use]
    pub fn from_tokenizer(inner: Tokenizer) -> Self {
        Self { inner }
    }

    /// Loads a tokenizer JSON artifact.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DatagenError::InvalidConfig(format!(
                "vocabulary {path:?} does not exist"
            )));
        }
        let inner = Tokenizer::from_file(path)?;
        Ok(Self { inner })
    }

    /// Provides immutable access to the underlying tokenizer.
    #[must_use]
    pub fn inner(&self) -> &Tokenizer {
        &self.inner
    }

    /// Vocabulary size including special tokens.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

impl Vocabulary for SubwordVocabulary {
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let encoding = self.inner.encode(text, false)?;
        Ok(encoding.get_tokens().to_vec())
    }

    fn tokenize_with_factors(
        &self,
        text: &str,
        factors: &str,
    ) -> Result<(Vec<String>, Vec<String>)> {
        if text.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let encoding = self.inner.encode(text, false)?;
        let words: Vec<&str> = factors.split_whitespace().collect();
        // word ids index the whitespace-separated words of `text`
        let token_factors = encoding
            .get_word_ids()
            .iter()
            .map(|word| {
                word.and_then(|idx| words.get(idx as usize).copied())
                    .unwrap_or(DEFAULT_FACTOR)
                    .to_owned()
            })
            .collect();
        Ok((encoding.get_tokens().to_vec(), token_factors))
    }
}
