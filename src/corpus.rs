//! Facilities for discovering parallel corpora and streaming them as aligned line tuples.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::error::{DatagenError, Result};
use crate::lang::{CorpusSplit, LanguagePair};

/// Extension marking a factor file, named `<stem>.<source>.factor`.
pub const FACTOR_EXTENSION: &str = "factor";

/// Source, target, and optional factor file holding the same sentences line by line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedFileSet {
    /// Source-language file.
    pub source: PathBuf,
    /// Target-language file.
    pub target: PathBuf,
    /// Per-word annotations of the source file.
    pub factor: Option<PathBuf>,
}

/// One aligned row of a parallel corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignedLineTuple {
    /// Source and target only.
    WithoutFactor {
        /// Source sentence.
        source: String,
        /// Target sentence.
        target: String,
    },
    /// Source, target, and source factors.
    WithFactor {
        /// Source sentence.
        source: String,
        /// Target sentence.
        target: String,
        /// Whitespace-separated factors, one per source word.
        factor: String,
    },
}

impl AlignedLineTuple {
    /// Builds a tuple from 2 (source, target) or 3 (source, target, factor) fields.
    pub fn from_fields(fields: Vec<String>) -> Result<Self> {
        let arity = fields.len();
        let mut fields = fields.into_iter();
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(source), Some(target), None, None) => Ok(Self::WithoutFactor { source, target }),
            (Some(source), Some(target), Some(factor), None) => Ok(Self::WithFactor {
                source,
                target,
                factor,
            }),
            _ => Err(DatagenError::InvalidConfig(format!(
                "aligned tuple must have 2 or 3 fields, found {arity}"
            ))),
        }
    }

    /// Source sentence.
    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            Self::WithoutFactor { source, .. } | Self::WithFactor { source, .. } => source,
        }
    }

    /// Target sentence.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::WithoutFactor { target, .. } | Self::WithFactor { target, .. } => target,
        }
    }

    /// Source factors when present.
    #[must_use]
    pub fn factor(&self) -> Option<&str> {
        match self {
            Self::WithoutFactor { .. } => None,
            Self::WithFactor { factor, .. } => Some(factor),
        }
    }
}

/// Directory holding `split` data of the unordered pair of `pair` under `root`.
#[must_use]
pub fn split_dir(root: &Path, pair: &LanguagePair, split: CorpusSplit) -> PathBuf {
    root.join(pair.corpus_key()).join(split.as_str())
}

/// Collects the aligned file sets of `pair` from the given directories.
///
/// A file `<stem>.<source>` pairs with `<stem>.<target>` and, when present,
/// `<stem>.<source>.factor`. Directories that do not exist contribute nothing; a file
/// without its counterpart is reported before any data is read.
pub fn collect_parallel_files<P: AsRef<Path>>(
    pair: &LanguagePair,
    dirs: &[P],
    split: CorpusSplit,
) -> Result<Vec<AlignedFileSet>> {
    let mut sets = Vec::new();
    for dir in dirs {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            debug!("skipping missing corpus directory {}", dir.display());
            continue;
        }

        let mut sources = BTreeMap::new();
        let mut targets = BTreeMap::new();
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|err| DatagenError::Internal(err.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
            ) else {
                continue;
            };
            if ext == pair.source {
                sources.insert(stem.to_string(), path.to_path_buf());
            } else if ext == pair.target {
                targets.insert(stem.to_string(), path.to_path_buf());
            }
        }

        let unpaired = sources
            .keys()
            .filter(|stem| !targets.contains_key(*stem))
            .map(|stem| format!("{stem}.{}", pair.source))
            .chain(
                targets
                    .keys()
                    .filter(|stem| !sources.contains_key(*stem))
                    .map(|stem| format!("{stem}.{}", pair.target)),
            )
            .collect::<Vec<_>>();
        if !unpaired.is_empty() {
            return Err(DatagenError::alignment(
                pair.key(),
                split.as_str(),
                format!(
                    "{} has {} source and {} target files; unpaired: {}",
                    dir.display(),
                    sources.len(),
                    targets.len(),
                    unpaired.join(", ")
                ),
            ));
        }

        for (stem, source) in sources {
            let factor = dir.join(format!("{stem}.{}.{FACTOR_EXTENSION}", pair.source));
            let target = targets
                .remove(&stem)
                .ok_or_else(|| DatagenError::Internal(format!("target for {stem} vanished")))?;
            sets.push(AlignedFileSet {
                source,
                target,
                factor: factor.is_file().then_some(factor),
            });
        }
    }
    debug!("{} ({split}): {} aligned file sets", pair.key(), sets.len());
    Ok(sets)
}

/// Every source and target file of the requested pairs' train and dev splits.
pub fn vocabulary_files<P: AsRef<Path>>(
    pairs: &[LanguagePair],
    roots: &[P],
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for root in roots {
        for pair in pairs {
            for split in CorpusSplit::ALL {
                let dir = split_dir(root.as_ref(), pair, split);
                for set in collect_parallel_files(pair, &[dir], split)? {
                    files.push(set.source);
                    files.push(set.target);
                }
            }
        }
    }
    Ok(files)
}

type LineStream = Lines<BufReader<File>>;

/// Streams an [`AlignedFileSet`] line-synchronously in fixed-size batches.
pub struct AlignedReader {
    streams: Vec<(PathBuf, LineStream)>,
    direction: String,
    split: CorpusSplit,
    rows: usize,
}

impl AlignedReader {
    /// Opens every file of the set.
    pub fn open(set: &AlignedFileSet, direction: &LanguagePair, split: CorpusSplit) -> Result<Self> {
        let mut paths = vec![&set.source, &set.target];
        paths.extend(set.factor.as_ref());
        let streams = paths
            .into_iter()
            .map(|path| {
                let file = File::open(path).map_err(|err| DatagenError::io(err, Some(path.clone())))?;
                Ok((path.clone(), BufReader::new(file).lines()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            streams,
            direction: direction.key(),
            split,
            rows: 0,
        })
    }

    /// Rows read so far.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Reads up to `batch_size` aligned rows; an empty batch means every file is exhausted.
    pub fn next_batch(&mut self, batch_size: usize) -> Result<Vec<AlignedLineTuple>> {
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            match self.next_row()? {
                Some(tuple) => batch.push(tuple),
                None => break,
            }
        }
        Ok(batch)
    }

    fn next_row(&mut self) -> Result<Option<AlignedLineTuple>> {
        let mut fields = Vec::with_capacity(self.streams.len());
        let mut exhausted = Vec::new();
        for (path, stream) in &mut self.streams {
            match stream.next() {
                Some(line) => {
                    fields.push(line.map_err(|err| DatagenError::io(err, Some(path.clone())))?)
                }
                None => exhausted.push(path.display().to_string()),
            }
        }
        if exhausted.len() == self.streams.len() {
            return Ok(None);
        }
        if !exhausted.is_empty() {
            return Err(DatagenError::alignment(
                self.direction.clone(),
                self.split.as_str(),
                format!(
                    "{} ended after {} lines while its partner files continue",
                    exhausted.join(", "),
                    self.rows
                ),
            ));
        }
        self.rows += 1;
        AlignedLineTuple::from_fields(fields).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn pair() -> LanguagePair {
        LanguagePair::new("en", "it")
    }

    #[test]
    fn collects_pairs_and_optional_factors() {
        let dir = tempdir().expect("tempdir");
        let train = split_dir(dir.path(), &pair(), CorpusSplit::Train);
        fs::create_dir_all(&train).unwrap();
        for name in ["b.en", "b.it", "a.en", "a.it", "a.en.factor", "notes.txt"] {
            fs::write(train.join(name), "x\n").unwrap();
        }

        let sets = collect_parallel_files(&pair(), &[&train], CorpusSplit::Train).unwrap();
        assert_eq!(
            sets,
            vec![
                AlignedFileSet {
                    source: train.join("a.en"),
                    target: train.join("a.it"),
                    factor: Some(train.join("a.en.factor")),
                },
                AlignedFileSet {
                    source: train.join("b.en"),
                    target: train.join("b.it"),
                    factor: None,
                },
            ]
        );

        let reversed = collect_parallel_files(&pair().reversed(), &[&train], CorpusSplit::Train)
            .unwrap();
        assert_eq!(reversed[0].source, train.join("a.it"));
        assert_eq!(reversed[0].factor, None);
    }

    #[test]
    fn unpaired_files_are_alignment_errors() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("a.en"), "x\n").unwrap();
        fs::write(dir.path().join("a.it"), "x\n").unwrap();
        fs::write(dir.path().join("b.en"), "x\n").unwrap();
        let err = collect_parallel_files(&pair(), &[dir.path()], CorpusSplit::Dev)
            .expect_err("should fail");
        assert!(matches!(
            err,
            DatagenError::Alignment { ref message, .. } if message.contains("b.en")
        ));
    }

    #[test]
    fn missing_directories_are_empty() {
        let dir = tempdir().expect("tempdir");
        let sets =
            collect_parallel_files(&pair(), &[dir.path().join("absent")], CorpusSplit::Train)
                .unwrap();
        assert!(sets.is_empty());
    }

    #[test]
    fn reader_streams_in_batches() {
        let dir = tempdir().expect("tempdir");
        let set = AlignedFileSet {
            source: dir.path().join("c.en"),
            target: dir.path().join("c.it"),
            factor: Some(dir.path().join("c.en.factor")),
        };
        fs::write(&set.source, "one\ntwo\nthree\n").unwrap();
        fs::write(&set.target, "uno\ndue\ntre\n").unwrap();
        fs::write(set.factor.as_ref().unwrap(), "A\nB\nC\n").unwrap();

        let mut reader = AlignedReader::open(&set, &pair(), CorpusSplit::Train).unwrap();
        let first = reader.next_batch(2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(
            first[1],
            AlignedLineTuple::WithFactor {
                source: "two".into(),
                target: "due".into(),
                factor: "B".into(),
            }
        );
        assert_eq!(reader.next_batch(2).unwrap().len(), 1);
        assert!(reader.next_batch(2).unwrap().is_empty());
        assert_eq!(reader.rows(), 3);
    }

    #[test]
    fn reader_rejects_row_count_mismatch() {
        let dir = tempdir().expect("tempdir");
        let set = AlignedFileSet {
            source: dir.path().join("c.en"),
            target: dir.path().join("c.it"),
            factor: None,
        };
        fs::write(&set.source, "one\ntwo\n").unwrap();
        fs::write(&set.target, "uno\n").unwrap();
        let mut reader = AlignedReader::open(&set, &pair(), CorpusSplit::Train).unwrap();
        let err = reader.next_batch(10).expect_err("should fail");
        assert!(matches!(err, DatagenError::Alignment { .. }));
    }

    #[test]
    fn tuple_arity_is_validated() {
        let tuple = AlignedLineTuple::from_fields(vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(tuple.factor(), None);
        for fields in [vec!["a".to_string()], vec!["a".into(); 4]] {
            let err = AlignedLineTuple::from_fields(fields).expect_err("should fail");
            assert!(matches!(err, DatagenError::InvalidConfig(_)));
        }
    }
}
