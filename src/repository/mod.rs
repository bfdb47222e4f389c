// src/repository/mod.rs

//! Repository access and package downloading
//!
//! This module provides functionality for:
//! - Parsing the remote package index (`packages.json`)
//! - Fetching the index and archives over HTTP or from a local mirror
//! - Caching downloaded archives

pub mod cache;

use crate::error::{Error, Result};
use indicatif::ProgressBar;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use cache::DownloadCache;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed requests
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Name of the index file at the repository base
pub const INDEX_FILE: &str = "packages.json";

/// One package as it appears in `packages.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Package entry in the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: String,
    pub version: String,
    pub url: String,
    pub dependencies: Vec<String>,
}

impl IndexEntry {
    /// Archive file name: the final path segment of the URL
    pub fn file_name(&self) -> &str {
        self.url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.name)
    }
}

/// In-memory package index, keyed by package name
#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    /// Parse an index from raw `packages.json` bytes
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let raw: BTreeMap<String, IndexRecord> = serde_json::from_slice(bytes)
            .map_err(|e| Error::IndexParseError(e.to_string()))?;

        let entries = raw
            .into_iter()
            .map(|(name, record)| {
                let entry = IndexEntry {
                    name: name.clone(),
                    version: record.version,
                    url: record.url,
                    dependencies: record.dependencies,
                };
                (name, entry)
            })
            .collect();

        Ok(Self { entries })
    }

    /// Build an index from entries
    pub fn from_entries(entries: impl IntoIterator<Item = IndexEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }

    /// Look up a package by name
    pub fn lookup(&self, name: &str) -> Result<&IndexEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::UnknownPackage(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Packages whose name contains any of `terms` (case-insensitive), by name
    pub fn search(&self, terms: &[String]) -> Vec<&IndexEntry> {
        let terms: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
        self.entries
            .values()
            .filter(|entry| {
                let name = entry.name.to_lowercase();
                terms.iter().any(|t| name.contains(t.as_str()))
            })
            .collect()
    }
}

/// Source of the package index and archives
pub trait Transport: Send + Sync {
    /// Fetch the raw `packages.json` bytes
    fn fetch_index(&self) -> Result<Vec<u8>>;

    /// Download `url` to `dest`, reporting progress on `progress`.
    /// Returns the number of bytes written.
    fn download(&self, url: &str, dest: &Path, progress: &ProgressBar) -> Result<u64>;
}

/// Select a transport for a repository URL: `http(s)://` goes over the
/// network, anything else (`file://` or a path) is read from disk.
pub fn transport_for(repo_url: &str) -> Result<Box<dyn Transport>> {
    if repo_url.starts_with("http://") || repo_url.starts_with("https://") {
        Ok(Box::new(HttpTransport::new(repo_url)?))
    } else {
        Ok(Box::new(LocalTransport::new(strip_file_scheme(repo_url))))
    }
}

fn strip_file_scheme(url: &str) -> &str {
    url.strip_prefix("file://").unwrap_or(url)
}

/// Write `reader` to `dest` through a temporary file in the same directory
fn write_atomically(reader: &mut dyn io::Read, dest: &Path) -> Result<u64> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| {
        Error::IoError(format!("Failed to create directory {}: {}", parent.display(), e))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
        Error::IoError(format!("Failed to create file in {}: {}", parent.display(), e))
    })?;

    let written = io::copy(reader, &mut temp)
        .map_err(|e| Error::DownloadError(format!("Failed to write downloaded data: {}", e)))?;

    temp.persist(dest).map_err(|e| {
        Error::IoError(format!("Failed to move download to {}: {}", dest.display(), e))
    })?;

    Ok(written)
}

/// HTTP client wrapper with retry support
pub struct HttpTransport {
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl HttpTransport {
    /// Create a new client for the repository at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(format!("xcer/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: MAX_RETRIES,
        })
    }

    /// GET with retries on connection errors. Non-2xx responses are not retried.
    fn get(&self, url: &str) -> std::result::Result<reqwest::blocking::Response, String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(format!("HTTP {} from {}", response.status(), url));
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(format!(
                            "{} failed after {} attempts: {}",
                            url, attempt, e
                        ));
                    }
                    warn!("Request attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Transport for HttpTransport {
    fn fetch_index(&self) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.base_url, INDEX_FILE);
        info!("Fetching package index from {}", url);

        let response = self.get(&url).map_err(Error::IndexFetchError)?;
        let bytes = response
            .bytes()
            .map_err(|e| Error::IndexFetchError(format!("Failed to read response: {}", e)))?;

        Ok(bytes.to_vec())
    }

    fn download(&self, url: &str, dest: &Path, progress: &ProgressBar) -> Result<u64> {
        info!("Downloading {} to {}", url, dest.display());

        let response = self.get(url).map_err(Error::DownloadError)?;
        if let Some(len) = response.content_length() {
            progress.set_length(len);
        }

        let mut reader = progress.wrap_read(response);
        let written = write_atomically(&mut reader, dest)?;
        progress.finish();

        debug!("Downloaded {} bytes from {}", written, url);
        Ok(written)
    }
}

/// Repository served from a local directory
pub struct LocalTransport {
    base_dir: PathBuf,
}

impl LocalTransport {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Archive URLs may be `file://` URLs, absolute paths, or paths
    /// relative to the repository directory.
    fn resolve(&self, url: &str) -> PathBuf {
        let path = Path::new(strip_file_scheme(url));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl Transport for LocalTransport {
    fn fetch_index(&self) -> Result<Vec<u8>> {
        let path = self.base_dir.join(INDEX_FILE);
        debug!("Reading package index from {}", path.display());

        fs::read(&path)
            .map_err(|e| Error::IndexFetchError(format!("{}: {}", path.display(), e)))
    }

    fn download(&self, url: &str, dest: &Path, progress: &ProgressBar) -> Result<u64> {
        let source = self.resolve(url);
        debug!("Copying {} to {}", source.display(), dest.display());

        let file = File::open(&source)
            .map_err(|e| Error::DownloadError(format!("{}: {}", source.display(), e)))?;
        if let Ok(meta) = file.metadata() {
            progress.set_length(meta.len());
        }

        let mut reader = progress.wrap_read(file);
        let written = write_atomically(&mut reader, dest)?;
        progress.finish();
        Ok(written)
    }
}
