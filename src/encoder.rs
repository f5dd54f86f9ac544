//! Streaming encoder turning raw parallel corpora into aligned subword streams.
//!
//! Every requested direction contributes to the same six output files
//! (`{train,dev}.{sl,tl,factor}`). Directions sharing an unordered language pair read their
//! corpus once; the token-count ratios of that single pass feed both the forward and the
//! backward length statistics.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use rustc_hash::FxHashSet;

use crate::corpus::{
    collect_parallel_files, split_dir, AlignedFileSet, AlignedReader, FACTOR_EXTENSION,
};
use crate::error::{DatagenError, Result};
use crate::lang::{target_languages, CorpusSplit, LanguagePair};
use crate::metrics::{sample_rss_kb, EncodingMetrics, SplitMetrics};
use crate::stats::{LengthStatistics, RunningStats};
use crate::tokenizer::{ParallelTokenizer, TokenizedLineTuple};
use crate::vocabulary::{language_tag, DEFAULT_FACTOR};

/// Extension of the tokenized source stream.
pub const SOURCE_EXTENSION: &str = "sl";
/// Extension of the tokenized target stream.
pub const TARGET_EXTENSION: &str = "tl";

/// Path prefix of a split's output streams, e.g. `<dir>/train`.
#[must_use]
pub fn output_prefix(dir: &Path, split: CorpusSplit) -> PathBuf {
    dir.join(split.as_str())
}

/// Outcome of an encoding pass.
#[derive(Debug, Clone)]
pub struct EncodedCorpora {
    /// Length-ratio statistics for every direction that produced training data.
    pub lengths: LengthStatistics,
    /// Line counters.
    pub metrics: EncodingMetrics,
}

/// Forward (target/source) and backward (source/target) token-count ratios.
#[derive(Debug, Default)]
struct RatioStats {
    forward: RunningStats,
    backward: RunningStats,
}

impl RatioStats {
    fn add(&mut self, source_len: usize, target_len: usize) {
        let (source_len, target_len) = (source_len as f64, target_len as f64);
        self.forward.add(target_len / source_len);
        self.backward.add(source_len / target_len);
    }
}

struct Stream {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Stream {
    fn create(path: PathBuf) -> Result<Self> {
        let file = File::create(&path).map_err(|err| DatagenError::io(err, Some(path.clone())))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    fn put(&mut self, text: &str) -> Result<()> {
        self.writer
            .write_all(text.as_bytes())
            .map_err(|err| DatagenError::io(err, Some(self.path.clone())))
    }

    fn finish(mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|err| DatagenError::io(err, Some(self.path.clone())))
    }
}

/// The three aligned output streams of one split.
struct SplitWriter {
    source: Stream,
    target: Stream,
    factor: Stream,
}

impl SplitWriter {
    fn create(dir: &Path, split: CorpusSplit) -> Result<Self> {
        let prefix = output_prefix(dir, split);
        Ok(Self {
            source: Stream::create(prefix.with_extension(SOURCE_EXTENSION))?,
            target: Stream::create(prefix.with_extension(TARGET_EXTENSION))?,
            factor: Stream::create(prefix.with_extension(FACTOR_EXTENSION))?,
        })
    }

    /// Appends one line to each stream.
    fn write(&mut self, tag: Option<&str>, source: &str, target: &str, factors: &str) -> Result<()> {
        if let Some(tag) = tag {
            self.source.put(tag)?;
            self.source.put(" ")?;
            self.factor.put(DEFAULT_FACTOR)?;
            self.factor.put(" ")?;
        }
        self.source.put(source)?;
        self.source.put("\n")?;
        self.target.put(target)?;
        self.target.put("\n")?;
        self.factor.put(factors)?;
        self.factor.put("\n")
    }

    fn finish(self) -> Result<()> {
        self.source.finish()?;
        self.target.finish()?;
        self.factor.finish()
    }
}

/// Reads parallel corpora batch by batch and writes tokenized, aligned streams.
pub struct CorpusEncoder<'a> {
    tokenizer: &'a ParallelTokenizer,
    batch_size: usize,
}

impl<'a> CorpusEncoder<'a> {
    /// Creates an encoder dispatching `batch_size` aligned rows at a time.
    #[must_use]
    pub fn new(tokenizer: &'a ParallelTokenizer, batch_size: usize) -> Self {
        Self {
            tokenizer,
            batch_size: batch_size.max(1),
        }
    }

    /// Encodes every direction found under `roots` into `out_dir`, creating or truncating
    /// the six output streams.
    pub fn encode<P: AsRef<Path>>(
        &self,
        directions: &[LanguagePair],
        roots: &[P],
        out_dir: &Path,
    ) -> Result<EncodedCorpora> {
        let start = Instant::now();
        let tag_sources = target_languages(directions).len() > 1;
        let mut train = SplitWriter::create(out_dir, CorpusSplit::Train)?;
        let mut dev = SplitWriter::create(out_dir, CorpusSplit::Dev)?;
        let mut lengths = LengthStatistics::new();
        let mut metrics = EncodingMetrics::new();
        let mut covered = FxHashSet::default();

        for direction in directions {
            if !covered.insert(direction.corpus_key()) {
                debug!(
                    "{direction}: corpus {} already encoded",
                    direction.corpus_key()
                );
                continue;
            }
            let tag = tag_sources.then(|| language_tag(&direction.target));

            // discover both splits first so alignment problems surface before any write
            let mut train_sets = Vec::new();
            let mut dev_sets = Vec::new();
            for root in roots {
                let root = root.as_ref();
                train_sets.extend(collect_parallel_files(
                    direction,
                    &[split_dir(root, direction, CorpusSplit::Train)],
                    CorpusSplit::Train,
                )?);
                dev_sets.extend(collect_parallel_files(
                    direction,
                    &[split_dir(root, direction, CorpusSplit::Dev)],
                    CorpusSplit::Dev,
                )?);
            }

            let mut train_ratios = RatioStats::default();
            let train_metrics = self.encode_split(
                direction,
                CorpusSplit::Train,
                &train_sets,
                tag.as_deref(),
                &mut train,
                &mut train_ratios,
            )?;
            let mut dev_ratios = RatioStats::default();
            let dev_metrics = self.encode_split(
                direction,
                CorpusSplit::Dev,
                &dev_sets,
                tag.as_deref(),
                &mut dev,
                &mut dev_ratios,
            )?;

            if train_ratios.forward.is_empty() {
                warn!("{direction}: no training sentences survived tokenization; length statistics not recorded");
            } else {
                let forward = train_ratios.forward.estimate()?;
                let backward = train_ratios.backward.estimate()?;
                info!(
                    "{direction}: samples={} modal_ratio={:.1} std_dev={:.3}",
                    train_ratios.forward.len(),
                    forward.modal_ratio,
                    forward.std_dev
                );
                lengths.insert(direction.key(), forward);
                lengths.insert(direction.reversed().key(), backward);
            }
            if !dev_ratios.forward.is_empty() {
                debug!(
                    "{direction}: dev samples={} modal_ratio={:.1}",
                    dev_ratios.forward.len(),
                    dev_ratios.forward.modal_value()?
                );
            }

            metrics.splits.push(train_metrics);
            metrics.splits.push(dev_metrics);
        }

        train.finish()?;
        dev.finish()?;
        metrics.total_duration = start.elapsed();
        metrics.rss_kb = sample_rss_kb();
        info!(
            "encoding complete: train={} dev={} dropped={} duration={:.2?} rss_kb={:?}",
            metrics.lines_written(CorpusSplit::Train),
            metrics.lines_written(CorpusSplit::Dev),
            metrics.lines_dropped(),
            metrics.total_duration,
            metrics.rss_kb
        );
        Ok(EncodedCorpora { lengths, metrics })
    }

    fn encode_split(
        &self,
        direction: &LanguagePair,
        split: CorpusSplit,
        sets: &[AlignedFileSet],
        tag: Option<&str>,
        writer: &mut SplitWriter,
        ratios: &mut RatioStats,
    ) -> Result<SplitMetrics> {
        let mut metrics = SplitMetrics::new(direction.key(), split);
        for set in sets {
            let mut reader = AlignedReader::open(set, direction, split)?;
            let mut dropped = 0usize;
            loop {
                let batch = reader.next_batch(self.batch_size)?;
                if batch.is_empty() {
                    break;
                }
                for tokenized in self.tokenizer.map_batch(&batch)? {
                    let TokenizedLineTuple::Encoded {
                        source,
                        target,
                        factors,
                        source_len,
                        target_len,
                    } = tokenized
                    else {
                        dropped += 1;
                        continue;
                    };
                    ratios.add(source_len, target_len);
                    writer.write(tag, &source, &target, &factors)?;
                }
            }
            let rows = reader.rows();
            info!(
                "{direction} {split}: {} lines={rows} dropped={dropped}",
                set.source.display()
            );
            metrics.files += 1;
            metrics.lines_read += rows;
            metrics.lines_dropped += dropped;
            metrics.lines_written += rows - dropped;
        }
        Ok(metrics)
    }
}
