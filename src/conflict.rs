// src/conflict.rs

//! File ownership conflict detection
//!
//! Runs after every archive of a batch is in the cache and before anything
//! is extracted. A candidate conflicts when it claims a path owned by an
//! installed package that the batch does not replace, or a path already
//! claimed by an earlier candidate of the same batch.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::packages::archive;
use crate::repository::{DownloadCache, Index};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info};

/// Path to the name of the package owning it
pub type FileOwners = HashMap<String, String>;

/// Files owned by installed packages, except the packages named in `skip`
pub fn installed_owners(db: &Database, skip: &HashSet<&str>) -> Result<FileOwners> {
    let mut owners = FileOwners::new();
    for record in db.records()? {
        if skip.contains(record.name.as_str()) {
            debug!("Skipping files of {}", record.key());
            continue;
        }
        for file in record.files {
            owners.insert(file, record.name.clone());
        }
    }
    Ok(owners)
}

/// Fail with `ConflictError` on the first path claimed twice.
///
/// `candidates` are package names in installation order. Their archives must
/// already be cached; a missing archive is a `CacheMiss`. Only the `.PKGINFO`
/// member of each archive is read.
///
/// On success, returns the ownership every path will have once the batch is
/// installed.
pub fn check_conflicts(
    candidates: &[String],
    index: &Index,
    db: &Database,
    cache: &DownloadCache,
) -> Result<FileOwners> {
    info!("Checking {} packages for file conflicts", candidates.len());

    let replacing: HashSet<&str> = candidates.iter().map(String::as_str).collect();
    let mut owners = installed_owners(db, &replacing)?;

    let archives = candidates
        .iter()
        .map(|name| {
            let entry = index.lookup(name)?;
            cache.lookup(entry).ok_or_else(|| Error::CacheMiss {
                package: name.clone(),
                path: cache.slot_path(entry),
            })
        })
        .collect::<Result<Vec<PathBuf>>>()?;

    for (name, path) in candidates.iter().zip(archives) {
        let meta = archive::read_metadata(&path)?;
        if &meta.name != name {
            return Err(Error::MalformedMetadata(format!(
                "archive {} for '{}' declares package '{}'",
                path.display(),
                name,
                meta.name
            )));
        }

        if let Some((file, owner)) = meta
            .files
            .iter()
            .find_map(|file| owners.get(file).map(|owner| (file, owner)))
        {
            return Err(Error::ConflictError {
                path: file.clone(),
                owner: owner.clone(),
                candidate: name.clone(),
            });
        }

        for file in meta.files {
            owners.insert(file, name.clone());
        }
    }

    info!("No conflicts found");
    Ok(owners)
}
