// src/packages/mod.rs

//! Package format support for Xcer
//!
//! This module provides the `.PKGINFO` metadata codec, archive reading and
//! staged extraction, and the archive builder.

pub mod archive;
pub mod builder;
pub mod metadata;

pub use metadata::Metadata;
