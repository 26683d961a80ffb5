//! Restore: materialize a verified entry into a project.
//!
//! The entry's tree is materialized into a staging directory inside the
//! project, then swapped into place: the existing `node_modules` (if any) is
//! renamed aside to a trash sibling, staging is renamed in, and the trash is
//! removed. If the second rename fails the trash is renamed back, so the
//! project only ever observes the prior tree or the complete new one.

use crate::error::{Failure, Reason};
use crate::layout::CacheLayout;
use crate::materialize::{materialize_tree, CancelToken, LinkStrategy, MaterializeStats};
use crate::stamp::unique_suffix;
use crate::store::verify_entry;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Result of a successful restore.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub duration_ms: u64,
    pub stats: MaterializeStats,
    pub strategy: LinkStrategy,
}

/// Materialize the entry for `key` into `<projectRoot>/node_modules`.
///
/// Any number of concurrent restores of one entry are permitted; the entry
/// is never written. A concurrent GC deleting the entry mid-restore surfaces
/// as `materialize_failed` and may be retried.
///
/// # Errors
/// Fails with the entry's verification reason when it is incomplete, with
/// `materialize_failed` when the staging copy fails, or `rename_failed`
/// when the final swap fails (prior tree restored best-effort).
pub fn restore(
    layout: &CacheLayout,
    key: &str,
    project_root: &Path,
    strategy: LinkStrategy,
    fs_concurrency: usize,
    cancel: &CancelToken,
) -> Result<RestoreReport, Failure> {
    let started = Instant::now();

    let verified = verify_entry(layout, key);
    if !verified.ok {
        let reason = verified.reason.unwrap_or(Reason::EntryNodeModulesMissing);
        return Err(Failure::new(
            reason,
            format!("entry {key} is not restorable"),
        ));
    }

    let paths = layout.entry_paths(key);
    let staging = project_root.join(format!(
        ".better-global-staging-node_modules-{}",
        unique_suffix()
    ));

    let outcome = match materialize_tree(
        &paths.node_modules,
        &staging,
        strategy,
        fs_concurrency,
        cancel,
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(Failure::new(
                Reason::MaterializeFailed,
                format!("staging materialization failed: {e}"),
            ));
        }
    };

    let node_modules = project_root.join("node_modules");
    if node_modules.symlink_metadata().is_ok() {
        let trash = project_root.join(format!(".trash-{}", unique_suffix()));
        if let Err(e) = fs::rename(&node_modules, &trash) {
            let _ = fs::remove_dir_all(&staging);
            return Err(Failure::new(
                Reason::RenameFailed,
                format!("could not move aside existing node_modules: {e}"),
            ));
        }
        if let Err(e) = fs::rename(&staging, &node_modules) {
            // Put the prior tree back; the project must not be left empty.
            let _ = fs::rename(&trash, &node_modules);
            let _ = fs::remove_dir_all(&staging);
            return Err(Failure::new(
                Reason::RenameFailed,
                format!("could not activate restored tree: {e}"),
            ));
        }
        let _ = fs::remove_dir_all(&trash);
    } else if let Err(e) = fs::rename(&staging, &node_modules) {
        let _ = fs::remove_dir_all(&staging);
        return Err(Failure::new(
            Reason::RenameFailed,
            format!("could not activate restored tree: {e}"),
        ));
    }

    Ok(RestoreReport {
        duration_ms: started.elapsed().as_millis() as u64,
        stats: outcome.stats,
        strategy,
    })
}
