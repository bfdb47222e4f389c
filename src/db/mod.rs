// src/db/mod.rs

//! Installed package database
//!
//! The database is a directory holding one subdirectory per installed
//! package, named `{name}-{version}`, each containing a `PKGINFO` metadata
//! document. The directory names are the only index: listing installed
//! packages is a directory scan that splits each name on its last hyphen.
//! Versions therefore may not contain hyphens (enforced by the metadata
//! codec). Hidden entries are ignored; they are used as scratch space while
//! writing records.

use crate::error::{Error, Result};
use crate::packages::metadata::{self, Metadata};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the metadata file inside each record directory
pub const RECORD_FILE: &str = "PKGINFO";

/// An installed package as recorded in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledRecord {
    pub name: String,
    pub version: String,
    pub depends: Vec<String>,
    pub files: BTreeSet<String>,
}

impl From<Metadata> for InstalledRecord {
    fn from(meta: Metadata) -> Self {
        Self {
            name: meta.name,
            version: meta.version,
            depends: meta.depends,
            files: meta.files,
        }
    }
}

impl InstalledRecord {
    pub fn key(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Owned files in deepest-first removal order (reverse lexicographic)
    pub fn files_for_removal(&self) -> impl Iterator<Item = &String> {
        self.files.iter().rev()
    }
}

/// Split a record directory name into `(name, version)` on the last hyphen
pub fn parse_record_key(key: &str) -> Option<(&str, &str)> {
    if key.starts_with('.') {
        return None;
    }
    let (name, version) = key.rsplit_once('-')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name, version))
}

/// Directory-backed store of installed package records
#[derive(Debug, Clone)]
pub struct Database {
    root: PathBuf,
}

impl Database {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_dir(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(format!("{}-{}", name, version))
    }

    /// Map of installed package name to version.
    ///
    /// A missing database directory means nothing is installed.
    pub fn list_installed(&self) -> Result<BTreeMap<String, String>> {
        let mut installed = BTreeMap::new();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(installed),
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to read database {}: {}",
                    self.root.display(),
                    e
                )));
            }
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let file_name = entry.file_name();
            let Some((name, version)) = file_name.to_str().and_then(parse_record_key) else {
                continue;
            };

            if let Some(other) = installed.insert(name.to_string(), version.to_string()) {
                warn!(
                    "Package {} has multiple records ({} and {}); database needs repair",
                    name, other, version
                );
            }
        }

        Ok(installed)
    }

    /// Look up the record for an installed package
    pub fn get_record(&self, name: &str) -> Result<Option<InstalledRecord>> {
        let installed = self.list_installed()?;
        match installed.get(name) {
            Some(version) => self.read_record(name, version).map(Some),
            None => Ok(None),
        }
    }

    /// Every installed record, ordered by name
    pub fn records(&self) -> Result<Vec<InstalledRecord>> {
        self.list_installed()?
            .iter()
            .map(|(name, version)| self.read_record(name, version))
            .collect()
    }

    fn read_record(&self, name: &str, version: &str) -> Result<InstalledRecord> {
        let path = self.record_dir(name, version).join(RECORD_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::MalformedMetadata(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let meta = Metadata::parse(&content)?;

        if meta.name != name || meta.version != version {
            return Err(Error::MalformedMetadata(format!(
                "{} describes {} instead of {}-{}",
                path.display(),
                meta.record_key(),
                name,
                version
            )));
        }

        Ok(meta.into())
    }

    /// Create the record for a freshly installed package.
    ///
    /// The metadata file is written into a hidden scratch directory and
    /// renamed to `{name}-{version}` last, so a record is either complete or
    /// absent. Fails if any version of the package is already recorded.
    pub fn write_record(&self, meta: Option<&Metadata>) -> Result<InstalledRecord> {
        let meta = meta.ok_or_else(|| {
            Error::RegistrationError("package carries no metadata document".to_string())
        })?;
        metadata::validate_identity(&meta.name, &meta.version)
            .map_err(|e| Error::RegistrationError(e.to_string()))?;

        if let Some(existing) = self.list_installed()?.get(&meta.name) {
            return Err(Error::RegistrationError(format!(
                "{} is already recorded at version {}",
                meta.name, existing
            )));
        }

        fs::create_dir_all(&self.root).map_err(|e| {
            Error::RegistrationError(format!(
                "Failed to create database {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let scratch = tempfile::Builder::new()
            .prefix(".record")
            .tempdir_in(&self.root)
            .map_err(|e| Error::RegistrationError(format!("Failed to create record: {}", e)))?;
        fs::write(scratch.path().join(RECORD_FILE), meta.serialize())
            .map_err(|e| Error::RegistrationError(format!("Failed to write record: {}", e)))?;

        let dest = self.record_dir(&meta.name, &meta.version);
        fs::rename(scratch.path(), &dest).map_err(|e| {
            Error::RegistrationError(format!("Failed to create {}: {}", dest.display(), e))
        })?;

        info!("Registered {}", meta.record_key());
        Ok(meta.clone().into())
    }

    /// Delete the record for `name`. Returns whether a record existed.
    pub fn delete_record(&self, name: &str) -> Result<bool> {
        let installed = self.list_installed()?;
        let Some(version) = installed.get(name) else {
            return Ok(false);
        };

        let dir = self.record_dir(name, version);
        fs::remove_dir_all(&dir).map_err(|e| {
            Error::IoError(format!("Failed to delete record {}: {}", dir.display(), e))
        })?;

        debug!("Deleted record {}", dir.display());
        Ok(true)
    }
}
