//! Running statistics over length ratios and the persisted per-direction summary.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{DatagenError, Result};
use crate::persist::write_atomic;

/// Streaming accumulator of count, sum, sum of squares, and a histogram quantized to 0.1.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    sum: f64,
    sum_sq: f64,
    count: usize,
    // (bucket in tenths, frequency) in first-seen order
    buckets: Vec<(i64, usize)>,
    positions: FxHashMap<i64, usize>,
}

impl RunningStats {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one sample.
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.sum_sq += value * value;
        self.count += 1;

        let bucket = (value * 10.0).floor() as i64;
        match self.positions.get(&bucket) {
            Some(&idx) => self.buckets[idx].1 += 1,
            None => {
                self.positions.insert(bucket, self.buckets.len());
                self.buckets.push((bucket, 1));
            }
        }
    }

    /// Number of samples seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true when no sample was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean of the samples.
    pub fn mean(&self) -> Result<f64> {
        if self.count == 0 {
            return Err(DatagenError::DivideByZero);
        }
        Ok(self.sum / self.count as f64)
    }

    /// Population standard deviation; a slightly negative variance from rounding is clamped to 0.
    pub fn std_dev(&self) -> Result<f64> {
        let mean = self.mean()?;
        let variance = self.sum_sq / self.count as f64 - mean * mean;
        Ok(variance.max(0.0).sqrt())
    }

    /// Most frequent quantized value. Ties go to the bucket seen first.
    pub fn modal_value(&self) -> Result<f64> {
        let mut best: Option<(i64, usize)> = None;
        for &(bucket, frequency) in &self.buckets {
            if best.map_or(true, |(_, top)| frequency > top) {
                best = Some((bucket, frequency));
            }
        }
        best.map(|(bucket, _)| bucket as f64 / 10.0)
            .ok_or(DatagenError::DivideByZero)
    }

    /// Summarises the accumulator as a [`LengthEstimate`].
    pub fn estimate(&self) -> Result<LengthEstimate> {
        Ok(LengthEstimate {
            modal_ratio: self.modal_value()?,
            std_dev: self.std_dev()?,
        })
    }
}

/// Modal length ratio and its standard deviation for one direction.
///
/// Serialized as a `[modal_ratio, std_dev]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct LengthEstimate {
    /// Most frequent target/source token-count ratio, quantized to 0.1.
    pub modal_ratio: f64,
    /// Standard deviation of the ratio.
    pub std_dev: f64,
}

impl From<(f64, f64)> for LengthEstimate {
    fn from((modal_ratio, std_dev): (f64, f64)) -> Self {
        Self {
            modal_ratio,
            std_dev,
        }
    }
}

impl From<LengthEstimate> for (f64, f64) {
    fn from(estimate: LengthEstimate) -> Self {
        (estimate.modal_ratio, estimate.std_dev)
    }
}

/// Per-direction length statistics keyed by `"{src}__{tgt}"`, consumed by the decoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LengthStatistics {
    entries: BTreeMap<String, LengthEstimate>,
}

impl LengthStatistics {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the estimate for a direction key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, estimate: LengthEstimate) {
        self.entries.insert(key.into(), estimate);
    }

    /// Looks up the estimate for a direction key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&LengthEstimate> {
        self.entries.get(key)
    }

    /// Number of directions recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no direction has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(direction key, estimate)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LengthEstimate)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Persists the map as JSON, replacing the destination atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
    }

    /// Loads a map previously written by [`LengthStatistics::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read(path).map_err(|err| DatagenError::io(err, Some(path.to_path_buf())))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mean_and_std_dev_match_closed_form() {
        let mut stats = RunningStats::new();
        for value in [1.0, 2.0, 3.0, 4.0] {
            stats.add(value);
        }
        assert_eq!(stats.len(), 4);
        assert!((stats.mean().unwrap() - 2.5).abs() < 1e-12);
        assert!((stats.std_dev().unwrap() - 1.25f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn constant_sequence_has_zero_std_dev() {
        let mut stats = RunningStats::new();
        for _ in 0..1000 {
            stats.add(0.1);
        }
        let std_dev = stats.std_dev().unwrap();
        assert!(!std_dev.is_nan());
        assert!(std_dev >= 0.0);
        assert!(std_dev < 1e-6);
    }

    #[test]
    fn empty_accumulator_reports_divide_by_zero() {
        let stats = RunningStats::new();
        assert!(stats.is_empty());
        assert!(matches!(stats.mean(), Err(DatagenError::DivideByZero)));
        assert!(matches!(stats.std_dev(), Err(DatagenError::DivideByZero)));
        assert!(matches!(stats.modal_value(), Err(DatagenError::DivideByZero)));
    }

    #[test]
    fn modal_value_rounds_down_to_one_decimal() {
        let mut stats = RunningStats::new();
        for value in [1.25, 1.29, 1.5, 0.75] {
            stats.add(value);
        }
        assert!((stats.modal_value().unwrap() - 1.2).abs() < 1e-12);
    }

    #[test]
    fn modal_value_ties_prefer_first_seen_bucket() {
        let mut stats = RunningStats::new();
        for value in [2.0, 1.0, 1.0, 2.0, 0.5] {
            stats.add(value);
        }
        assert!((stats.modal_value().unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn length_statistics_serialize_as_pairs() {
        let mut lengths = LengthStatistics::new();
        lengths.insert(
            "en__it",
            LengthEstimate {
                modal_ratio: 1.1,
                std_dev: 0.25,
            },
        );
        let value: serde_json::Value = serde_json::to_value(&lengths).unwrap();
        assert_eq!(value, serde_json::json!({"en__it": [1.1, 0.25]}));

        let dir = tempdir().unwrap();
        let path = dir.path().join("decode_lengths.json");
        lengths.save(&path).unwrap();
        assert_eq!(LengthStatistics::load(&path).unwrap(), lengths);
    }
}
