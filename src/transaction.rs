// src/transaction.rs

//! Install, remove and upgrade
//!
//! Installation runs in phases. Resolution, download and conflict checking
//! touch nothing in the install root or database; any failure there aborts
//! the whole batch. Only then is each package, in dependency order, staged
//! and validated, its previous version removed, its files moved into place
//! and its database record written.
//!
//! The final phase is not atomic across packages: a crash between removing
//! an old version and writing the new record leaves files without a record.

use crate::context::Context;
use crate::db::InstalledRecord;
use crate::error::Result;
use crate::filesystem;
use crate::packages::archive;
use crate::repository::Index;
use crate::conflict::{self, FileOwners};
use crate::resolver;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// A package selected for installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub version: String,
    /// Version currently installed, when this is an upgrade
    pub installed_version: Option<String>,
}

impl Candidate {
    pub fn is_upgrade(&self) -> bool {
        self.installed_version.is_some()
    }
}

/// Result of an install or upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Everything requested is already installed at the index version
    NothingToDo,
    /// The caller declined the plan
    Aborted,
    /// Packages installed, in installation order
    Installed(Vec<Candidate>),
}

/// Result of a removal request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    NotInstalled,
    Removed(InstalledRecord),
}

/// An installed package with a different version in the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpgrade {
    pub name: String,
    pub installed: String,
    pub available: String,
}

/// Resolve `names` and drop packages already installed at the index version
pub fn plan_install(ctx: &Context, index: &Index, names: &[String]) -> Result<Vec<Candidate>> {
    let resolved = resolver::resolve(names, index)?;
    let installed = ctx.db().list_installed()?;

    let mut candidates = Vec::new();
    for name in resolved {
        let entry = index.lookup(&name)?;
        let installed_version = installed.get(&name).cloned();

        if installed_version.as_deref() == Some(entry.version.as_str()) {
            debug!("{}-{} already installed", name, entry.version);
            continue;
        }

        candidates.push(Candidate {
            name,
            version: entry.version.clone(),
            installed_version,
        });
    }

    Ok(candidates)
}

/// Install `names` and their dependencies from a freshly fetched index.
///
/// `confirm` sees the plan after resolution and before any download; returning
/// `false` aborts without side effects.
pub fn install<F>(ctx: &Context, names: &[String], confirm: F) -> Result<InstallOutcome>
where
    F: FnOnce(&[Candidate]) -> Result<bool>,
{
    let index = ctx.fetch_index()?;
    install_from_index(ctx, &index, names, confirm)
}

/// Install `names` and their dependencies from an already fetched index
pub fn install_from_index<F>(
    ctx: &Context,
    index: &Index,
    names: &[String],
    confirm: F,
) -> Result<InstallOutcome>
where
    F: FnOnce(&[Candidate]) -> Result<bool>,
{
    filesystem::ensure_writable(ctx.root_dir())?;

    let candidates = plan_install(ctx, index, names)?;
    if candidates.is_empty() {
        info!("Nothing to do for {:?}", names);
        return Ok(InstallOutcome::NothingToDo);
    }

    if !confirm(&candidates)? {
        info!("Installation declined");
        return Ok(InstallOutcome::Aborted);
    }

    let entries = candidates
        .iter()
        .map(|c| index.lookup(&c.name))
        .collect::<Result<Vec<_>>>()?;
    let archives = ctx
        .cache()
        .fetch_all(&entries, ctx.transport(), ctx.show_progress())?;

    let batch: Vec<String> = candidates.iter().map(|c| c.name.clone()).collect();
    let owners = conflict::check_conflicts(&batch, index, ctx.db(), ctx.cache())?;

    let _guard = ctx.lock_mutations();
    for (candidate, archive_path) in candidates.iter().zip(&archives) {
        apply(ctx, candidate, archive_path, &owners)?;
    }

    Ok(InstallOutcome::Installed(candidates))
}

/// Install one package whose batch has passed conflict checking.
///
/// `owners` is the ownership returned by the conflict check; files of the
/// replaced version that now belong to another package are left in place.
fn apply(
    ctx: &Context,
    candidate: &Candidate,
    archive_path: &Path,
    owners: &FileOwners,
) -> Result<()> {
    let root = ctx.root_dir();

    let staged = archive::stage(archive_path, root)?;
    let metadata = staged.metadata().clone();

    if let Some(old) = ctx.db().get_record(&candidate.name)? {
        info!("Replacing {} with {}", old.key(), metadata.record_key());
        uninstall(ctx, &old, owners)?;
    }

    let moved = staged.commit(root)?;
    ctx.db().write_record(Some(&metadata))?;

    info!("Installed {} ({} files)", metadata.record_key(), moved);
    Ok(())
}

/// Remove an installed package. Removing a package that is not installed is
/// not an error.
pub fn remove(ctx: &Context, name: &str) -> Result<RemoveOutcome> {
    filesystem::ensure_writable(ctx.root_dir())?;

    let _guard = ctx.lock_mutations();
    let Some(record) = ctx.db().get_record(name)? else {
        info!("{} is not installed", name);
        return Ok(RemoveOutcome::NotInstalled);
    };

    let others = conflict::installed_owners(ctx.db(), &HashSet::from([name]))?;
    uninstall(ctx, &record, &others)?;
    Ok(RemoveOutcome::Removed(record))
}

/// Delete a record's files deepest-first, prune emptied directories, then
/// drop the record. Files that `owners` assigns to another package are kept.
/// Callers hold the mutation lock.
fn uninstall(ctx: &Context, record: &InstalledRecord, owners: &FileOwners) -> Result<()> {
    let root = ctx.root_dir();

    let files: Vec<&String> = record
        .files_for_removal()
        .filter(|file| match owners.get(*file) {
            Some(owner) if *owner != record.name => {
                debug!("Keeping {} (now owned by {})", file, owner);
                false
            }
            _ => true,
        })
        .collect();

    let removed = filesystem::remove_files(root, files.iter().copied())?;
    let pruned = filesystem::prune_empty_parents(root, files.iter().copied());
    ctx.db().delete_record(&record.name)?;

    info!(
        "Uninstalled {} ({} files removed, {} directories pruned)",
        record.key(),
        removed,
        pruned
    );
    Ok(())
}

/// Installed packages whose index version differs from the installed one
pub fn pending_upgrades(ctx: &Context, index: &Index) -> Result<Vec<PendingUpgrade>> {
    Ok(ctx
        .db()
        .list_installed()?
        .into_iter()
        .filter_map(|(name, installed)| {
            let entry = index.get(&name)?;
            (entry.version != installed).then(|| PendingUpgrade {
                available: entry.version.clone(),
                name,
                installed,
            })
        })
        .collect())
}

/// Upgrade every installed package that has a different version in the index
pub fn upgrade_all<F>(ctx: &Context, confirm: F) -> Result<InstallOutcome>
where
    F: FnOnce(&[Candidate]) -> Result<bool>,
{
    let index = ctx.fetch_index()?;
    let pending = pending_upgrades(ctx, &index)?;
    if pending.is_empty() {
        return Ok(InstallOutcome::NothingToDo);
    }

    let names: Vec<String> = pending.into_iter().map(|p| p.name).collect();
    install_from_index(ctx, &index, &names, confirm)
}
