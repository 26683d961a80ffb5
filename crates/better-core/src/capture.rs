//! Capture: publish a project's freshly-installed `node_modules` as a cache
//! entry.
//!
//! The tree is materialized into a uniquely-named staging sibling of the
//! entry directory, metadata is written, then one `rename` publishes the
//! entry. Concurrent captures of the same key cannot collide in staging;
//! whichever rename lands second detects the published entry and discards
//! its own staging — the outcome is still a valid entry.

use crate::config::CacheOptions;
use crate::error::{Failure, Reason};
use crate::key::EligibleKey;
use crate::layout::CacheLayout;
use crate::materialize::{materialize_tree, CancelToken, MaterializeStats};
use crate::stamp::{now_iso, unique_suffix};
use crate::store::{verify_entry, write_meta, EntryMeta};
use crate::version::created_by;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Result of a successful capture.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReport {
    pub duration_ms: u64,
    pub stats: MaterializeStats,
}

/// Capture `<projectRoot>/node_modules` into the entry for the derived key.
///
/// # Errors
/// Fails with `node_modules_missing` when the project has no installed tree,
/// `materialize_failed` when the staging copy fails, or `rename_failed` when
/// publication fails and no concurrent capture published the entry either.
pub fn capture(
    layout: &CacheLayout,
    derived: &EligibleKey,
    project_root: &Path,
    opts: &CacheOptions,
    cancel: &CancelToken,
) -> Result<CaptureReport, Failure> {
    let started = Instant::now();

    let node_modules = project_root.join("node_modules");
    if !node_modules.is_dir() {
        return Err(Failure::new(
            Reason::NodeModulesMissing,
            format!("no node_modules at {}", node_modules.display()),
        ));
    }

    let paths = layout.entry_paths(&derived.key);
    let shard = layout.entry_shard_dir(&derived.key);
    fs::create_dir_all(&shard)
        .map_err(|e| Failure::io(Reason::MaterializeFailed, "create_dir", &shard, &e))?;

    let staging = shard.join(format!("{}.staging-{}", derived.key, unique_suffix()));

    let outcome = materialize_tree(
        &node_modules,
        &staging.join("node_modules"),
        opts.link_strategy,
        opts.fs_concurrency,
        cancel,
    );
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(Failure::new(
                Reason::MaterializeFailed,
                format!("staging copy failed: {e}"),
            ));
        }
    };

    let meta = EntryMeta {
        key: derived.key.clone(),
        created_at: now_iso(),
        created_by: created_by(),
        source_project_root: project_root.display().to_string(),
        lock_hash: derived.lock_hash.clone(),
        lockfile: derived.lockfile.clone(),
        fingerprint: derived.fingerprint.clone(),
        pm: opts.pm.as_str().to_string(),
        engine: opts.engine.clone(),
        scripts_mode: opts.scripts_mode,
        cache_mode: opts.cache_mode,
        stats: outcome.stats.clone(),
    };
    if let Err(e) = write_meta(&staging.join(crate::store::ENTRY_META_FILE), &meta) {
        let _ = fs::remove_dir_all(&staging);
        return Err(Failure::new(
            Reason::MaterializeFailed,
            format!("metadata write failed: {e}"),
        ));
    }

    // Stale partial entry from an older engine version, or an entry being
    // replaced. Best effort: a concurrent reader may hold it open.
    if paths.root.exists() {
        let _ = fs::remove_dir_all(&paths.root);
    }

    if let Err(e) = fs::rename(&staging, &paths.root) {
        // Lost a publication race: the other capture's entry is equivalent
        // (same key means same inputs).
        let _ = fs::remove_dir_all(&staging);
        if !verify_entry(layout, &derived.key).ok {
            return Err(Failure::new(
                Reason::RenameFailed,
                format!(
                    "publish rename to {} failed: {e}",
                    paths.root.display()
                ),
            ));
        }
    }

    Ok(CaptureReport {
        duration_ms: started.elapsed().as_millis() as u64,
        stats: outcome.stats,
    })
}
