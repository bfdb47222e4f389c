// src/packages/archive.rs

//! Package archive access
//!
//! Archives are gzip-compressed tarballs holding a `.PKGINFO` metadata
//! document and a payload tree rooted at `.`. Installation happens in two
//! phases: the payload is first unpacked into a staging directory inside the
//! install root and validated against the metadata, then committed by moving
//! every staged entry into place.

use crate::error::{Error, Result};
use crate::packages::metadata::Metadata;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Entry};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

/// Name of the metadata member inside every archive
pub const PKGINFO: &str = ".PKGINFO";

/// Open and decompress a package archive
fn open_archive(path: &Path) -> Result<Archive<GzDecoder<BufReader<File>>>> {
    let file = File::open(path).map_err(|e| {
        Error::IoError(format!("Failed to open archive {}: {}", path.display(), e))
    })?;

    Ok(Archive::new(GzDecoder::new(BufReader::new(file))))
}

/// Member path with `.` components removed (`./usr/bin/a` -> `usr/bin/a`)
fn member_path<R: Read>(entry: &Entry<'_, R>) -> Result<PathBuf> {
    let path = entry
        .path()
        .map_err(|e| Error::ExtractionError(format!("Failed to get entry path: {}", e)))?;

    Ok(path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect())
}

fn read_pkginfo<R: Read>(entry: &mut Entry<'_, R>) -> Result<Metadata> {
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| Error::MalformedMetadata(format!("Failed to read {}: {}", PKGINFO, e)))?;
    Metadata::parse(&content)
}

/// Read the metadata document from an archive without unpacking its payload
pub fn read_metadata(path: &Path) -> Result<Metadata> {
    let mut archive = open_archive(path)?;

    for entry in archive
        .entries()
        .map_err(|e| Error::ExtractionError(format!("Failed to read archive: {}", e)))?
    {
        let mut entry =
            entry.map_err(|e| Error::ExtractionError(format!("Failed to read entry: {}", e)))?;

        if member_path(&entry)? == Path::new(PKGINFO) {
            return read_pkginfo(&mut entry);
        }
    }

    Err(Error::RegistrationError(format!(
        "{} not found in {}",
        PKGINFO,
        path.display()
    )))
}

/// An archive payload unpacked into a staging directory, not yet visible
/// in the install root
#[derive(Debug)]
pub struct StagedPackage {
    dir: TempDir,
    metadata: Metadata,
}

impl StagedPackage {
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Staging directory holding the unpacked payload
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Move the staged payload into `root`.
    ///
    /// Existing directories are reused; existing files are replaced. The
    /// staging directory is removed afterwards. Returns the number of
    /// non-directory entries moved.
    pub fn commit(self, root: &Path) -> Result<usize> {
        let stage = self.dir.path();

        // Collect first: entries are moved out of the tree while we go.
        let entries = WalkDir::new(stage)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::ExtractionError(format!("Failed to walk staged files: {}", e)))?;

        let mut moved = 0;
        for entry in entries {
            let rel = entry
                .path()
                .strip_prefix(stage)
                .map_err(|e| Error::ExtractionError(e.to_string()))?;
            let target = root.join(rel);

            if entry.file_type().is_dir() {
                match fs::symlink_metadata(&target) {
                    Ok(meta) if meta.is_dir() => {}
                    Ok(_) => {
                        return Err(Error::ExtractionError(format!(
                            "Cannot create directory {}: a file is in the way",
                            target.display()
                        )));
                    }
                    Err(_) => {
                        fs::create_dir(&target).map_err(|e| {
                            Error::ExtractionError(format!(
                                "Failed to create {}: {}",
                                target.display(),
                                e
                            ))
                        })?;
                        let perms = entry
                            .metadata()
                            .map_err(|e| Error::ExtractionError(e.to_string()))?
                            .permissions();
                        fs::set_permissions(&target, perms)?;
                    }
                }
                continue;
            }

            if fs::symlink_metadata(&target).is_ok_and(|m| m.is_dir()) {
                return Err(Error::ExtractionError(format!(
                    "Cannot install {}: a directory is in the way",
                    target.display()
                )));
            }

            fs::rename(entry.path(), &target).map_err(|e| {
                Error::ExtractionError(format!(
                    "Failed to move {} into place: {}",
                    target.display(),
                    e
                ))
            })?;
            moved += 1;
        }

        debug!(
            "Committed {} files of {} into {}",
            moved,
            self.metadata.record_key(),
            root.display()
        );
        Ok(moved)
    }
}

/// Unpack an archive's payload into a staging directory inside `root` and
/// validate it against the archive's metadata.
///
/// Staging inside the install root keeps the final move a same-filesystem
/// rename.
pub fn stage(archive_path: &Path, root: &Path) -> Result<StagedPackage> {
    let dir = tempfile::Builder::new()
        .prefix(".xcer-stage-")
        .tempdir_in(root)
        .map_err(|e| {
            Error::ExtractionError(format!(
                "Failed to create staging directory in {}: {}",
                root.display(),
                e
            ))
        })?;

    let mut archive = open_archive(archive_path)?;
    let mut metadata = None;
    // Non-directory payload members, checked against `.PKGINFO` once read
    let mut payload = Vec::new();

    for entry in archive
        .entries()
        .map_err(|e| Error::ExtractionError(format!("Failed to read archive: {}", e)))?
    {
        let mut entry =
            entry.map_err(|e| Error::ExtractionError(format!("Failed to read entry: {}", e)))?;
        let rel = member_path(&entry)?;

        // The `.` member of the payload tree
        if rel.as_os_str().is_empty() {
            continue;
        }

        if rel == Path::new(PKGINFO) {
            metadata = Some(read_pkginfo(&mut entry)?);
            continue;
        }

        let unpacked = entry.unpack_in(dir.path()).map_err(|e| {
            Error::ExtractionError(format!("Failed to unpack {}: {}", rel.display(), e))
        })?;
        if !unpacked {
            return Err(Error::ExtractionError(format!(
                "Archive member {} escapes the install root",
                rel.display()
            )));
        }

        if !entry.header().entry_type().is_dir() {
            payload.push(rel.to_string_lossy().into_owned());
        }
    }

    let metadata = metadata.ok_or_else(|| {
        Error::RegistrationError(format!(
            "{} not found in {}",
            PKGINFO,
            archive_path.display()
        ))
    })?;

    if let Some(undeclared) = payload.iter().find(|file| !metadata.files.contains(*file)) {
        return Err(Error::ExtractionError(format!(
            "Archive member '{}' is not declared by {}",
            undeclared,
            metadata.record_key()
        )));
    }

    for file in &metadata.files {
        if fs::symlink_metadata(dir.path().join(file)).is_err() {
            return Err(Error::ExtractionError(format!(
                "{} declares '{}' but the archive does not contain it",
                metadata.record_key(),
                file
            )));
        }
    }

    debug!(
        "Staged {} in {}",
        metadata.record_key(),
        dir.path().display()
    );

    Ok(StagedPackage { dir, metadata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;

    /// Write a tarball with the given `(path, contents)` members
    fn write_archive(path: &Path, members: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, contents) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_read_metadata() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("a-1.0.tar.gz");
        write_archive(
            &archive,
            &[
                (PKGINFO, "name = a\nversion = 1.0\nfile = usr/bin/a\n"),
                ("usr/bin/a", "#!/bin/sh\n"),
            ],
        );

        let meta = read_metadata(&archive).unwrap();
        assert_eq!(meta.name, "a");
        assert!(meta.files.contains("usr/bin/a"));
    }

    #[test]
    fn test_read_metadata_missing_pkginfo() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("bad.tar.gz");
        write_archive(&archive, &[("usr/bin/a", "x")]);

        let err = read_metadata(&archive).unwrap_err();
        assert!(matches!(err, Error::RegistrationError(_)));
    }

    #[test]
    fn test_stage_and_commit() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("a-1.0.tar.gz");
        let root = temp.path().join("root");
        fs::create_dir_all(root.join("usr")).unwrap();
        write_archive(
            &archive,
            &[
                (PKGINFO, "name = a\nversion = 1.0\nfile = usr/bin/a\n"),
                ("./usr/bin/a", "binary"),
            ],
        );

        let staged = stage(&archive, &root).unwrap();
        assert_eq!(staged.metadata().name, "a");
        assert!(staged.path().join("usr/bin/a").exists());
        // Nothing visible before commit
        assert!(!root.join("usr/bin/a").exists());

        let moved = staged.commit(&root).unwrap();
        assert_eq!(moved, 1);
        assert_eq!(fs::read_to_string(root.join("usr/bin/a")).unwrap(), "binary");

        // Staging directory is cleaned up
        let leftovers: Vec<_> = fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n.to_string_lossy().starts_with(".xcer-stage-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_stage_rejects_missing_declared_file() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("a-1.0.tar.gz");
        let root = temp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        write_archive(
            &archive,
            &[(PKGINFO, "name = a\nversion = 1.0\nfile = usr/bin/missing\n")],
        );

        let err = stage(&archive, &root).unwrap_err();
        assert!(matches!(err, Error::ExtractionError(_)));
    }

    #[test]
    fn test_stage_rejects_undeclared_member() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("p-1.0.tar.gz");
        let root = temp.path().join("root");
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::write(root.join("etc/q.conf"), "owned by q").unwrap();
        write_archive(
            &archive,
            &[
                (PKGINFO, "name = p\nversion = 1.0\nfile = usr/bin/p\n"),
                ("usr/bin/p", "binary"),
                ("etc/q.conf", "replaced"),
            ],
        );

        match stage(&archive, &root).unwrap_err() {
            Error::ExtractionError(msg) => assert!(msg.contains("etc/q.conf")),
            other => panic!("expected extraction error, got {:?}", other),
        }
        assert_eq!(
            fs::read_to_string(root.join("etc/q.conf")).unwrap(),
            "owned by q"
        );
        assert!(!root.join("usr/bin/p").exists());
    }

    #[test]
    fn test_commit_replaces_existing_file() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("a-1.0.tar.gz");
        let root = temp.path().join("root");
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::write(root.join("etc/a.conf"), "old").unwrap();
        write_archive(
            &archive,
            &[
                (PKGINFO, "name = a\nversion = 1.0\nfile = etc/a.conf\n"),
                ("etc/a.conf", "new"),
            ],
        );

        stage(&archive, &root).unwrap().commit(&root).unwrap();
        assert_eq!(fs::read_to_string(root.join("etc/a.conf")).unwrap(), "new");
    }
}
