//! Order-preserving parallel tokenization of aligned line tuples.

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::corpus::AlignedLineTuple;
use crate::error::{DatagenError, Result};
use crate::vocabulary::{Vocabulary, VocabularyBuilder, DEFAULT_FACTOR};

/// Result of tokenizing one aligned tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizedLineTuple {
    /// Whitespace-joined subwords of each stream with the source and target token counts.
    Encoded {
        /// Tokenized source sentence.
        source: String,
        /// Tokenized target sentence.
        target: String,
        /// One factor per source token.
        factors: String,
        /// Number of source tokens.
        source_len: usize,
        /// Number of target tokens.
        target_len: usize,
    },
    /// Source or target tokenized to nothing; the tuple is left out of every stream.
    Dropped,
}

impl TokenizedLineTuple {
    /// Returns true when the tuple must not be written.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped)
    }

    /// Tokenized source text, `None` when dropped.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Encoded { source, .. } => Some(source),
            Self::Dropped => None,
        }
    }

    /// Tokenized target text, `None` when dropped.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Encoded { target, .. } => Some(target),
            Self::Dropped => None,
        }
    }

    /// Factor text, `None` when dropped.
    #[must_use]
    pub fn factors(&self) -> Option<&str> {
        match self {
            Self::Encoded { factors, .. } => Some(factors),
            Self::Dropped => None,
        }
    }

    /// Source token count, 0 when dropped.
    #[must_use]
    pub fn source_len(&self) -> usize {
        match self {
            Self::Encoded { source_len, .. } => *source_len,
            Self::Dropped => 0,
        }
    }

    /// Target token count, 0 when dropped.
    #[must_use]
    pub fn target_len(&self) -> usize {
        match self {
            Self::Encoded { target_len, .. } => *target_len,
            Self::Dropped => 0,
        }
    }
}

/// Tokenizes a single tuple. Every line is trimmed first; sources with factors are
/// tokenized jointly with them, otherwise each source token gets [`DEFAULT_FACTOR`].
pub fn tokenize_tuple(
    vocabulary: &dyn Vocabulary,
    tuple: &AlignedLineTuple,
) -> Result<TokenizedLineTuple> {
    let (source_tokens, factor_tokens) = match tuple.factor() {
        Some(factor) => vocabulary.tokenize_with_factors(tuple.source().trim(), factor.trim())?,
        None => {
            let tokens = vocabulary.tokenize(tuple.source().trim())?;
            let factors = vec![DEFAULT_FACTOR.to_owned(); tokens.len()];
            (tokens, factors)
        }
    };
    let target_tokens = vocabulary.tokenize(tuple.target().trim())?;

    if source_tokens.is_empty() || target_tokens.is_empty() {
        return Ok(TokenizedLineTuple::Dropped);
    }
    Ok(TokenizedLineTuple::Encoded {
        source: source_tokens.join(" "),
        target: target_tokens.join(" "),
        factors: factor_tokens.join(" "),
        source_len: source_tokens.len(),
        target_len: target_tokens.len(),
    })
}

/// Fixed pool of tokenization workers sharing one immutable vocabulary.
pub struct ParallelTokenizer {
    vocabulary: Arc<dyn Vocabulary>,
    pool: ThreadPool,
}

impl ParallelTokenizer {
    /// Creates a pool of `workers` threads around a loaded vocabulary.
    pub fn new(vocabulary: Arc<dyn Vocabulary>, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(DatagenError::InvalidConfig(
                "tokenizer pool needs at least one worker".into(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("tokenizer-{idx}"))
            .build()
            .map_err(|err| DatagenError::Internal(err.to_string()))?;
        Ok(Self { vocabulary, pool })
    }

    /// Loads the vocabulary at `path` once and starts the pool.
    pub fn initialize(
        builder: &dyn VocabularyBuilder,
        path: &Path,
        workers: usize,
    ) -> Result<Self> {
        let vocabulary = builder.load(path)?;
        Self::new(vocabulary, workers)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Tokenizes a batch; the output has the same length and order as the input.
    pub fn map_batch(&self, batch: &[AlignedLineTuple]) -> Result<Vec<TokenizedLineTuple>> {
        let vocabulary = self.vocabulary.as_ref();
        self.pool.install(|| {
            batch
                .par_iter()
                .map(|tuple| tokenize_tuple(vocabulary, tuple))
                .collect()
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Splits on whitespace; factors are paired word by word.
    pub(crate) struct WhitespaceVocabulary;

    impl Vocabulary for WhitespaceVocabulary {
        fn tokenize(&self, text: &str) -> Result<Vec<String>> {
            Ok(text.split_whitespace().map(str::to_owned).collect())
        }

        fn tokenize_with_factors(
            &self,
            text: &str,
            factors: &str,
        ) -> Result<(Vec<String>, Vec<String>)> {
            let tokens = self.tokenize(text)?;
            let mut labels: Vec<String> = factors.split_whitespace().map(str::to_owned).collect();
            labels.resize(tokens.len(), DEFAULT_FACTOR.to_owned());
            Ok((tokens, labels))
        }
    }

    fn tuple(source: &str, target: &str) -> AlignedLineTuple {
        AlignedLineTuple::WithoutFactor {
            source: source.into(),
            target: target.into(),
        }
    }

    #[test]
    fn trims_and_joins_tokens() {
        let result = tokenize_tuple(&WhitespaceVocabulary, &tuple("  hello  world \n", "ciao mondo"))
            .unwrap();
        assert_eq!(
            result,
            TokenizedLineTuple::Encoded {
                source: "hello world".into(),
                target: "ciao mondo".into(),
                factors: format!("{DEFAULT_FACTOR} {DEFAULT_FACTOR}"),
                source_len: 2,
                target_len: 2,
            }
        );
    }

    #[test]
    fn factor_lines_are_tokenized_jointly() {
        let tuple = AlignedLineTuple::WithFactor {
            source: "the cat".into(),
            target: "il gatto".into(),
            factor: " DET NOUN ".into(),
        };
        let result = tokenize_tuple(&WhitespaceVocabulary, &tuple).unwrap();
        assert_eq!(result.factors(), Some("DET NOUN"));
    }

    #[test]
    fn empty_side_drops_the_tuple() {
        for (source, target) in [("hello", "   "), ("", "ciao"), ("", "")] {
            let result = tokenize_tuple(&WhitespaceVocabulary, &tuple(source, target)).unwrap();
            assert!(result.is_dropped());
            assert_eq!(result.source(), None);
            assert_eq!(result.target(), None);
            assert_eq!(result.factors(), None);
            assert_eq!(result.source_len(), 0);
            assert_eq!(result.target_len(), 0);
        }
    }

    #[test]
    fn map_batch_preserves_length_and_order() {
        let tokenizer = ParallelTokenizer::new(Arc::new(WhitespaceVocabulary), 4).unwrap();
        assert_eq!(tokenizer.workers(), 4);
        let batch: Vec<_> = (0..1000)
            .map(|idx| {
                let target = if idx % 7 == 0 { String::new() } else { format!("t{idx}") };
                tuple(&format!("s{idx} x"), &target)
            })
            .collect();
        let results = tokenizer.map_batch(&batch).unwrap();
        assert_eq!(results.len(), batch.len());
        for (idx, result) in results.iter().enumerate() {
            if idx % 7 == 0 {
                assert!(result.is_dropped());
            } else {
                assert_eq!(result.source(), Some(format!("s{idx} x").as_str()));
                assert_eq!(result.target_len(), 1);
            }
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(ParallelTokenizer::new(Arc::new(WhitespaceVocabulary), 0).is_err());
    }
}
