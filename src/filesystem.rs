// src/filesystem.rs

//! Install root file operations: permission probing, owned-file removal and
//! empty-directory pruning.

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, trace};

/// Fail with `PermissionError` unless files can be created in `root`.
///
/// Probes by creating (and immediately removing) a temporary file.
pub fn ensure_writable(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Err(Error::IoError(format!(
            "Install root '{}' does not exist",
            root.display()
        )));
    }

    tempfile::Builder::new()
        .prefix(".xcer-probe")
        .tempfile_in(root)
        .map(drop)
        .map_err(|_| Error::PermissionError(root.to_path_buf()))
}

/// Delete owned files under `root`, in the order given.
///
/// Files that are already gone count as removed. Returns the number of files
/// actually deleted.
pub fn remove_files<'a>(root: &Path, files: impl IntoIterator<Item = &'a String>) -> Result<usize> {
    let mut removed = 0;

    for file in files {
        let target = root.join(file);
        match fs::remove_file(&target) {
            Ok(()) => {
                trace!("Removed {}", target.display());
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} already absent", target.display());
            }
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to remove {}: {}",
                    target.display(),
                    e
                )));
            }
        }
    }

    Ok(removed)
}

/// Best-effort removal of each file's parent directory if it is now empty.
///
/// The install root itself is never removed. Non-empty or missing
/// directories are left alone. Returns the number of directories removed.
pub fn prune_empty_parents<'a>(root: &Path, files: impl IntoIterator<Item = &'a String>) -> usize {
    let mut pruned = 0;

    for file in files {
        let target = root.join(file);
        let Some(parent) = target.parent() else {
            continue;
        };
        if parent == root || !parent.starts_with(root) {
            continue;
        }

        // remove_dir refuses non-empty directories
        if fs::remove_dir(parent).is_ok() {
            trace!("Pruned {}", parent.display());
            pruned += 1;
        }
    }

    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn owned(files: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = files.iter().map(|f| f.to_string()).collect();
        v.sort();
        v.reverse();
        v
    }

    #[test]
    fn test_ensure_writable() {
        let temp = tempdir().unwrap();
        ensure_writable(temp.path()).unwrap();
        // The probe does not linger
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_ensure_writable_missing_root() {
        let temp = tempdir().unwrap();
        assert!(ensure_writable(&temp.path().join("nope")).is_err());
    }

    #[test]
    fn test_remove_and_prune() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("usr/share/doc/a")).unwrap();
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        fs::write(root.join("usr/share/doc/a/README"), "x").unwrap();
        fs::write(root.join("usr/bin/a"), "x").unwrap();
        fs::write(root.join("usr/bin/other"), "x").unwrap();

        let files = owned(&["usr/share/doc/a/README", "usr/bin/a"]);
        assert_eq!(remove_files(root, &files).unwrap(), 2);
        assert_eq!(prune_empty_parents(root, &files), 1);

        assert!(!root.join("usr/share/doc/a").exists());
        // Still holds another package's file
        assert!(root.join("usr/bin/other").exists());
    }

    #[test]
    fn test_remove_tolerates_missing_files() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("present"), "x").unwrap();

        let files = owned(&["present", "gone", "dir/also-gone"]);
        assert_eq!(remove_files(temp.path(), &files).unwrap(), 1);
        assert_eq!(prune_empty_parents(temp.path(), &files), 0);
    }

    #[test]
    fn test_prune_never_removes_root() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("top"), "x").unwrap();

        let files = owned(&["top"]);
        remove_files(&root, &files).unwrap();
        prune_empty_parents(&root, &files);
        assert!(root.is_dir());
    }
}
