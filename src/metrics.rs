//! Counters describing an encoding pass.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lang::CorpusSplit;

/// Line counts for one direction and split.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplitMetrics {
    /// Direction key such as `en__it`.
    pub direction: String,
    /// Split the counts belong to.
    pub split: CorpusSplit,
    /// Aligned file sets streamed.
    pub files: usize,
    /// Aligned rows read from disk.
    pub lines_read: usize,
    /// Rows written to the output streams.
    pub lines_written: usize,
    /// Rows left out because one side tokenized to nothing.
    pub lines_dropped: usize,
}

impl SplitMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new(direction: impl Into<String>, split: CorpusSplit) -> Self {
        Self {
            direction: direction.into(),
            split,
            files: 0,
            lines_read: 0,
            lines_written: 0,
            lines_dropped: 0,
        }
    }
}

/// Aggregate counters produced by an encoding pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingMetrics {
    /// Per direction and split counters in processing order.
    pub splits: Vec<SplitMetrics>,
    /// Wall time of the pass.
    pub total_duration: Duration,
    /// Resident set size sampled at the end of the pass.
    pub rss_kb: Option<usize>,
}

impl EncodingMetrics {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            splits: Vec::new(),
            total_duration: Duration::ZERO,
            rss_kb: None,
        }
    }

    /// Rows written across every direction for `split`.
    #[must_use]
    pub fn lines_written(&self, split: CorpusSplit) -> usize {
        self.splits
            .iter()
            .filter(|entry| entry.split == split)
            .map(|entry| entry.lines_written)
            .sum()
    }

    /// Rows dropped across every direction and split.
    #[must_use]
    pub fn lines_dropped(&self) -> usize {
        self.splits.iter().map(|entry| entry.lines_dropped).sum()
    }
}

impl Default for EncodingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .find_map(|line| {
            line.strip_prefix("VmRSS:")?
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok())
        })
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<usize> {
    None
}

/// Samples the current resident set size (RSS) on supported platforms.
pub fn sample_rss_kb() -> Option<usize> {
    current_rss_kb()
}
