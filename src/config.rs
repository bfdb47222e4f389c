// src/config.rs

//! Client configuration
//!
//! The configuration file is searched for in, first match wins:
//! `~/.config/xology/xcer.conf`, `/etc/xcer.conf`, `./xcer.conf`.
//!
//! ```toml
//! [options]
//! RootDir = "/"
//! DBPath = "/var/lib/xcer"
//! RepoURL = "http://192.168.8.50:8000"
//! ```
//!
//! The archive cache lives in the invoking user's cache directory and is not
//! configurable from the file.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Repository used when the configuration does not name one
pub const DEFAULT_REPO_URL: &str = "http://192.168.8.50:8000";

/// Resolved client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Install root that package payloads are extracted into
    pub root_dir: PathBuf,
    /// Installed package database
    pub db_path: PathBuf,
    /// Download cache
    pub cache_dir: PathBuf,
    /// Repository base URL (`http(s)://`, `file://` or a directory)
    pub repo_url: String,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    options: Options,
}

#[derive(Debug, Deserialize)]
struct Options {
    #[serde(rename = "RootDir")]
    root_dir: PathBuf,
    #[serde(rename = "DBPath")]
    db_path: PathBuf,
    #[serde(rename = "RepoURL")]
    repo_url: Option<String>,
}

impl Config {
    /// Locations searched by [`Config::load`], in priority order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("xology").join("xcer.conf"));
        }
        paths.push(PathBuf::from("/etc/xcer.conf"));
        paths.push(PathBuf::from("xcer.conf"));
        paths
    }

    /// Default cache directory: `<user cache dir>/xcer`
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(std::env::temp_dir)
            .join("xcer")
    }

    /// Load the first configuration file found in [`Config::search_paths`]
    pub fn load() -> Result<Self> {
        let paths = Self::search_paths();
        match paths.iter().find(|p| p.is_file()) {
            Some(path) => Self::from_file(path),
            None => Err(Error::ConfigNotFound(
                paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound(path.display().to_string())
            } else {
                Error::ConfigError(format!("{}: {}", path.display(), e))
            }
        })?;

        Self::parse(&content).map_err(|e| match e {
            Error::ConfigError(msg) => Error::ConfigError(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parse configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))?;

        Ok(Self {
            root_dir: file.options.root_dir,
            db_path: file.options.db_path,
            cache_dir: Self::default_cache_dir(),
            repo_url: file
                .options
                .repo_url
                .unwrap_or_else(|| DEFAULT_REPO_URL.to_string()),
        })
    }
}
