// src/context.rs

//! Session context threaded through every operation
//!
//! Bundles the configuration with the database, download cache and
//! repository transport built from it, so operations never consult global
//! state and tests can inject their own transport.

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::repository::{self, DownloadCache, Index, Transport};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

pub struct Context {
    config: Config,
    db: Database,
    cache: DownloadCache,
    transport: Box<dyn Transport>,
    show_progress: bool,
    /// Serializes database and install-root mutations
    mutation_lock: Mutex<()>,
}

impl Context {
    /// Build a context using the transport selected by the configured
    /// repository URL
    pub fn new(config: Config) -> Result<Self> {
        let transport = repository::transport_for(&config.repo_url)?;
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: Config, transport: Box<dyn Transport>) -> Self {
        Self {
            db: Database::new(&config.db_path),
            cache: DownloadCache::new(&config.cache_dir),
            config,
            transport,
            show_progress: false,
            mutation_lock: Mutex::new(()),
        }
    }

    /// Enable download progress bars
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root_dir(&self) -> &Path {
        &self.config.root_dir
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn cache(&self) -> &DownloadCache {
        &self.cache
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn show_progress(&self) -> bool {
        self.show_progress
    }

    /// Fetch and parse the repository index. Never cached across calls.
    pub fn fetch_index(&self) -> Result<Index> {
        let bytes = self.transport.fetch_index()?;
        let index = Index::load(&bytes)?;
        if index.is_empty() {
            warn!("Repository {} publishes no packages", self.config.repo_url);
        } else {
            info!("Loaded index with {} packages", index.len());
        }
        Ok(index)
    }

    pub(crate) fn lock_mutations(&self) -> MutexGuard<'_, ()> {
        self.mutation_lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}
