// src/packages/builder.rs

//! Package archive builder
//!
//! Packages a source tree plus metadata into `<name>-<version>.tar.gz`.
//! The archive starts with a synthesized `.PKGINFO` listing every regular
//! file and symlink of the tree (sorted), followed by the tree itself.

use crate::error::{Error, Result};
use crate::packages::archive::{self, PKGINFO};
use crate::packages::metadata::{self, Metadata};
use crate::repository::{INDEX_FILE, IndexRecord};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Build a package archive from `source_dir`, returning the archive path
pub fn build_package(
    source_dir: &Path,
    name: &str,
    version: &str,
    depends: &[String],
    output_dir: &Path,
) -> Result<PathBuf> {
    metadata::validate_identity(name, version)?;

    if !source_dir.is_dir() {
        return Err(Error::IoError(format!(
            "Source directory not found at '{}'",
            source_dir.display()
        )));
    }

    let entries = WalkDir::new(source_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::IoError(format!("Failed to walk {}: {}", source_dir.display(), e)))?;

    let mut meta = Metadata::new(name, version);
    meta.depends = depends.to_vec();

    let mut members = Vec::with_capacity(entries.len());
    for entry in &entries {
        let rel = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| Error::IoError(e.to_string()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !entry.file_type().is_dir() {
            meta.files.insert(rel.clone());
        }
        members.push((entry.path().to_path_buf(), rel, entry.file_type().is_dir()));
    }

    fs::create_dir_all(output_dir).map_err(|e| {
        Error::IoError(format!("Failed to create {}: {}", output_dir.display(), e))
    })?;
    let archive_path = output_dir.join(format!("{}.tar.gz", meta.record_key()));

    let file = File::create(&archive_path).map_err(|e| {
        Error::IoError(format!("Failed to create {}: {}", archive_path.display(), e))
    })?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    let pkginfo = meta.serialize();
    let mut header = tar::Header::new_gnu();
    header.set_size(pkginfo.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, PKGINFO, pkginfo.as_bytes())?;

    for (path, rel, is_dir) in &members {
        if *is_dir {
            builder.append_dir(rel, path)?;
        } else {
            builder.append_path_with_name(path, rel)?;
        }
    }

    builder.into_inner()?.finish()?;

    info!(
        "Built {} ({} files) at {}",
        meta.record_key(),
        meta.files.len(),
        archive_path.display()
    );
    Ok(archive_path)
}

/// Write `packages.json` for every archive in `repo_dir`.
///
/// Archive URLs are `<base_url>/<file name>`. When several archives carry
/// the same package name the last one in file-name order wins.
pub fn write_index(repo_dir: &Path, base_url: &str) -> Result<PathBuf> {
    let mut archives: Vec<PathBuf> = fs::read_dir(repo_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.to_string_lossy().ends_with(".tar.gz"))
        .collect();
    archives.sort();

    let mut index: BTreeMap<String, IndexRecord> = BTreeMap::new();
    for path in archives {
        let meta = archive::read_metadata(&path)?;
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };

        let record = IndexRecord {
            version: meta.version.clone(),
            url: format!("{}/{}", base_url.trim_end_matches('/'), file_name),
            dependencies: meta.depends.clone(),
        };
        if let Some(previous) = index.insert(meta.name.clone(), record) {
            warn!(
                "Multiple archives for {}: replacing version {} with {}",
                meta.name, previous.version, meta.version
            );
        }
    }

    let json = serde_json::to_string_pretty(&index)
        .map_err(|e| Error::IoError(format!("Failed to serialize index: {}", e)))?;
    let index_path = repo_dir.join(INDEX_FILE);
    fs::write(&index_path, json)?;

    info!("Wrote index of {} packages to {}", index.len(), index_path.display());
    Ok(index_path)
}
