// src/packages/metadata.rs

//! Package metadata document (`.PKGINFO`)
//!
//! A metadata document is a sequence of `key = value` lines:
//!
//! ```text
//! name = hello
//! version = 1.0
//! depend = libc
//! file = usr/bin/hello
//! ```
//!
//! `name` and `version` must appear exactly once. `depend` and `file` may
//! repeat. Values are taken verbatim after the first `=` and trimmed; there
//! is no escaping, so values cannot contain newlines and a leading or trailing
//! space is lost.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;

/// Parsed metadata document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    pub version: String,
    pub depends: Vec<String>,
    /// Install-root-relative paths owned by the package
    pub files: BTreeSet<String>,
}

impl Metadata {
    /// Create metadata with no dependencies or files
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            depends: Vec::new(),
            files: BTreeSet::new(),
        }
    }

    /// Parse a metadata document
    pub fn parse(content: &str) -> Result<Self> {
        let mut name = None;
        let mut version = None;
        let mut depends = Vec::new();
        let mut files = BTreeSet::new();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::MalformedMetadata(format!(
                    "line {}: expected 'key = value', got '{}'",
                    lineno + 1,
                    line
                )));
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "name" => set_once(&mut name, "name", value)?,
                "version" => set_once(&mut version, "version", value)?,
                "depend" => depends.push(value.to_string()),
                "file" => {
                    files.insert(normalize_path(value)?);
                }
                _ => {} // Ignore unknown keys
            }
        }

        let name = name.ok_or_else(|| Error::MalformedMetadata("missing 'name'".to_string()))?;
        let version =
            version.ok_or_else(|| Error::MalformedMetadata("missing 'version'".to_string()))?;
        validate_identity(&name, &version)?;

        Ok(Self {
            name,
            version,
            depends,
            files,
        })
    }

    /// Serialize to the on-disk text form. Files are emitted in sorted order.
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Database directory name for this package: `{name}-{version}`
    pub fn record_key(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

fn set_once(slot: &mut Option<String>, key: &str, value: &str) -> Result<()> {
    if slot.is_some() {
        return Err(Error::MalformedMetadata(format!("duplicate '{}'", key)));
    }
    *slot = Some(value.to_string());
    Ok(())
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "name = {}", self.name)?;
        writeln!(f, "version = {}", self.version)?;
        for dep in &self.depends {
            writeln!(f, "depend = {}", dep)?;
        }
        for file in &self.files {
            writeln!(f, "file = {}", file)?;
        }
        Ok(())
    }
}

/// Check that a name/version pair can be stored as a `{name}-{version}` key.
///
/// The database splits keys on the last hyphen, so versions may not contain one.
pub fn validate_identity(name: &str, version: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains(char::is_whitespace)
    {
        return Err(Error::MalformedMetadata(format!(
            "invalid package name '{}'",
            name
        )));
    }

    if version.is_empty()
        || version.contains('-')
        || version.contains('/')
        || version.contains(char::is_whitespace)
    {
        return Err(Error::MalformedMetadata(format!(
            "invalid version '{}' for package '{}' (versions may not contain '-')",
            version, name
        )));
    }

    Ok(())
}

/// Normalize an owned path to install-root-relative form.
///
/// `/etc/foo.conf`, `./etc/foo.conf` and `etc/foo.conf` all map to
/// `etc/foo.conf`. Paths that climb out of the root are rejected.
pub fn normalize_path(path: &str) -> Result<String> {
    let parts: Vec<&str> = path
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();

    if parts.is_empty() || parts.contains(&"..") {
        return Err(Error::MalformedMetadata(format!(
            "invalid file path '{}'",
            path
        )));
    }

    Ok(parts.join("/"))
}
