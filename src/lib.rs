// src/lib.rs

//! Xcer Package Manager
//!
//! Minimal package manager: a builder that packs a directory tree plus a
//! `.PKGINFO` metadata document into a `.tar.gz`, and a client that installs
//! such archives from a remote index.
//!
//! # Architecture
//!
//! - Directory database: one `{name}-{version}` directory per installed package
//! - Dependency-first resolution with cycle detection
//! - Batch semantics: download and conflict-check everything before touching
//!   the install root
//! - Staged extraction: payloads are unpacked and validated before being
//!   moved into place, and the database record is written last

pub mod config;
pub mod conflict;
pub mod context;
pub mod db;
mod error;
pub mod filesystem;
pub mod packages;
pub mod repository;
pub mod resolver;
pub mod transaction;

pub use config::Config;
pub use context::Context;
pub use error::{Error, Result};
