// src/repository/cache.rs

//! Download cache for package archives
//!
//! Each archive gets one slot in the cache directory. The slot name is the
//! archive file name prefixed with a short SHA-256 digest of the full URL, so
//! two repositories publishing `foo-1.0.tar.gz` do not alias each other.
//! Slots are filled once and reused; the check-then-fetch sequence for a slot
//! runs under a per-slot lock so parallel downloads never fetch the same slot
//! twice.

use crate::error::{Error, Result};
use crate::repository::{IndexEntry, Transport};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Hex digits of the URL digest used in slot names
const SLOT_DIGEST_LEN: usize = 16;

/// Local cache of downloaded archives
#[derive(Debug)]
pub struct DownloadCache {
    dir: PathBuf,
    /// Per-slot fetch locks. Entries are never evicted; the map lives as long
    /// as the session's cache handle and holds one entry per slot touched.
    slots: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DownloadCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Cache path for a package's archive, whether or not it exists yet
    pub fn slot_path(&self, entry: &IndexEntry) -> PathBuf {
        let digest = format!("{:x}", Sha256::digest(entry.url.as_bytes()));
        self.dir.join(format!(
            "{}-{}",
            &digest[..SLOT_DIGEST_LEN],
            entry.file_name()
        ))
    }

    /// Cached archive for a package, if present
    pub fn lookup(&self, entry: &IndexEntry) -> Option<PathBuf> {
        let path = self.slot_path(entry);
        path.is_file().then_some(path)
    }

    fn slot_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(path.to_path_buf()).or_default().clone()
    }

    /// Return the cached archive for `entry`, downloading it on a miss
    pub fn fetch(
        &self,
        entry: &IndexEntry,
        transport: &dyn Transport,
        progress: &ProgressBar,
    ) -> Result<PathBuf> {
        let path = self.slot_path(entry);
        let lock = self.slot_lock(&path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if path.is_file() {
            debug!("Using cached package for {}: {}", entry.name, path.display());
            progress.finish_with_message("cached");
            return Ok(path);
        }

        transport
            .download(&entry.url, &path, progress)
            .map_err(|e| match e {
                Error::DownloadError(msg) => {
                    Error::DownloadError(format!("{}: {}", entry.name, msg))
                }
                other => other,
            })?;

        info!("Cached {} at {}", entry.name, path.display());
        Ok(path)
    }

    /// Download every entry in parallel, returning archive paths in input
    /// order. Fails if any single download fails.
    pub fn fetch_all(
        &self,
        entries: &[&IndexEntry],
        transport: &dyn Transport,
        show_progress: bool,
    ) -> Result<Vec<PathBuf>> {
        let multi = if show_progress {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        let style = ProgressStyle::default_bar()
            .template("{prefix:>16} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        entries
            .par_iter()
            .map(|entry| {
                let bar = multi.add(ProgressBar::new(0));
                bar.set_style(style.clone());
                bar.set_prefix(entry.name.clone());
                self.fetch(entry, transport, &bar)
            })
            .collect()
    }
}
