//! Crash-safe file replacement helpers.
//!
//! Every artifact a stage declares is produced under a temporary name and renamed into place,
//! so an interrupted run never leaves a half-written file behind a completed checkpoint.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DatagenError, Result};

/// Returns `<path>.<suffix>`, the sibling used while `path` is being produced.
#[must_use]
pub fn staging_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("artifact"));
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Writes `bytes` to `path` through a temporary sibling and an atomic rename.
pub fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let tmp = staging_path(path, "tmp");
    fs::write(&tmp, bytes).map_err(|err| DatagenError::io(err, Some(tmp.clone())))?;
    rename(&tmp, path)
}

/// Copies `from` to `to` through a temporary sibling and an atomic rename.
pub fn copy_atomic<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> Result<()> {
    let (from, to) = (from.as_ref(), to.as_ref());
    ensure_parent(to)?;
    let tmp = staging_path(to, "tmp");
    fs::copy(from, &tmp).map_err(|err| DatagenError::io(err, Some(from.to_path_buf())))?;
    rename(&tmp, to)
}

/// Moves a fully written directory into place, replacing any previous one.
pub fn replace_dir<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> Result<()> {
    let (from, to) = (from.as_ref(), to.as_ref());
    if to.exists() {
        fs::remove_dir_all(to).map_err(|err| DatagenError::io(err, Some(to.to_path_buf())))?;
    }
    rename(from, to)
}

/// Creates an empty directory, discarding leftovers of an interrupted attempt.
pub fn fresh_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        fs::remove_dir_all(path).map_err(|err| DatagenError::io(err, Some(path.to_path_buf())))?;
    }
    fs::create_dir_all(path).map_err(|err| DatagenError::io(err, Some(path.to_path_buf())))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|err| DatagenError::io(err, Some(parent.to_path_buf())))?;
        }
    }
    Ok(())
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|err| DatagenError::io(err, Some(to.to_path_buf())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("state.json");
        write_atomic(&target, b"{}").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"{}");
        assert!(!staging_path(&target, "tmp").exists());
    }

    #[test]
    fn replace_dir_swaps_contents() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("out");
        let new = dir.path().join("out.partial");
        fs::create_dir_all(&old).unwrap();
        fs::write(old.join("stale"), b"x").unwrap();
        fresh_dir(&new).unwrap();
        fs::write(new.join("fresh"), b"y").unwrap();

        replace_dir(&new, &old).unwrap();
        assert!(old.join("fresh").exists());
        assert!(!old.join("stale").exists());
        assert!(!new.exists());
    }
}
