//! Garbage collection over the materializations store.
//!
//! GC works purely from file identity and mtimes observed on disk; it never
//! consults the state index, so index staleness cannot corrupt eviction
//! decisions. Entries touched within the last few seconds are left alone to
//! narrow the race against a restore that just verified them.

use crate::error::Error;
use crate::key::is_valid_key;
use crate::layout::CacheLayout;
use crate::scan::scan_tree;
use crate::state::GcPolicy;
use crate::store::ENTRY_META_FILE;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Entries younger than this are never evicted.
pub const RECENT_ENTRY_GRACE: Duration = Duration::from_secs(5);

/// Staging debris older than this is swept alongside GC.
pub const STAGING_SWEEP_AGE: Duration = Duration::from_secs(60 * 60);

/// One deletion performed (or planned, under dry-run).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcDeletion {
    pub key: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Outcome of a GC pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcReport {
    pub entries_removed: u64,
    pub bytes_freed: u64,
    pub deletions: Vec<GcDeletion>,
    pub dry_run: bool,
}

#[derive(Debug)]
struct GcCandidate {
    key: String,
    root: PathBuf,
    mtime: SystemTime,
    physical_bytes: u64,
}

/// Enumerate entries in ascending mtime order (oldest first).
fn list_entries(layout: &CacheLayout) -> Result<Vec<GcCandidate>, Error> {
    let store = layout.materializations_dir();
    let mut candidates = Vec::new();
    if !store.is_dir() {
        return Ok(candidates);
    }

    for shard_a in read_dirs(&store)? {
        for shard_b in read_dirs(&shard_a)? {
            for entry_root in read_dirs(&shard_b)? {
                let Some(name) = entry_root.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !is_valid_key(name) {
                    continue;
                }
                let mtime = effective_mtime(&entry_root);
                let physical_bytes = scan_tree(&entry_root)?.physical_bytes;
                candidates.push(GcCandidate {
                    key: name.to_string(),
                    root: entry_root,
                    mtime,
                    physical_bytes,
                });
            }
        }
    }

    candidates.sort_by_key(|c| c.mtime);
    Ok(candidates)
}

fn read_dirs(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut out = Vec::new();
    let entries =
        fs::read_dir(dir).map_err(|e| Error::path_io("read_dir", dir.to_path_buf(), e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// The freshest of the entry directory's own mtime and its metadata file's.
/// A capture that just republished an entry bumps at least one of them.
fn effective_mtime(entry_root: &Path) -> SystemTime {
    let dir_mtime = fs::metadata(entry_root)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let meta_mtime = fs::metadata(entry_root.join(ENTRY_META_FILE))
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    dir_mtime.max(meta_mtime)
}

fn within_grace(mtime: SystemTime) -> bool {
    SystemTime::now()
        .duration_since(mtime)
        .map(|age| age < RECENT_ENTRY_GRACE)
        .unwrap_or(true)
}

fn delete_candidate(candidate: &GcCandidate, dry_run: bool, report: &mut GcReport) {
    if !dry_run {
        // Idempotent: the entry may already be gone.
        let _ = fs::remove_dir_all(&candidate.root);
    }
    report.entries_removed += 1;
    report.bytes_freed += candidate.physical_bytes;
    report.deletions.push(GcDeletion {
        key: candidate.key.clone(),
        path: candidate.root.clone(),
        bytes: candidate.physical_bytes,
    });
}

/// Remove every entry whose effective mtime is older than `cutoff`.
///
/// # Errors
/// Returns an error if the store cannot be enumerated.
pub fn gc_by_age(
    layout: &CacheLayout,
    cutoff: SystemTime,
    dry_run: bool,
) -> Result<GcReport, Error> {
    let mut report = GcReport {
        dry_run,
        ..GcReport::default()
    };
    for candidate in list_entries(layout)? {
        if candidate.mtime < cutoff && !within_grace(candidate.mtime) {
            delete_candidate(&candidate, dry_run, &mut report);
        }
    }
    Ok(report)
}

/// Remove oldest entries until total physical bytes are at or below `target`.
///
/// # Errors
/// Returns an error if the store cannot be enumerated.
pub fn gc_by_size(
    layout: &CacheLayout,
    target_bytes: u64,
    dry_run: bool,
) -> Result<GcReport, Error> {
    let mut report = GcReport {
        dry_run,
        ..GcReport::default()
    };
    let candidates = list_entries(layout)?;
    let mut total: u64 = candidates.iter().map(|c| c.physical_bytes).sum();

    for candidate in candidates {
        if total <= target_bytes {
            break;
        }
        if within_grace(candidate.mtime) {
            continue;
        }
        total = total.saturating_sub(candidate.physical_bytes);
        delete_candidate(&candidate, dry_run, &mut report);
    }
    Ok(report)
}

/// Apply a persisted policy: age cutoff first, then the size cap.
///
/// # Errors
/// Returns an error if the store cannot be enumerated.
pub fn run_gc(layout: &CacheLayout, policy: &GcPolicy, dry_run: bool) -> Result<GcReport, Error> {
    let mut report = GcReport {
        dry_run,
        ..GcReport::default()
    };

    if let Some(days) = policy.max_age_days {
        let cutoff = SystemTime::now() - Duration::from_secs(u64::from(days) * 24 * 60 * 60);
        merge(&mut report, gc_by_age(layout, cutoff, dry_run)?);
    }
    if let Some(target) = policy.max_size_bytes {
        merge(&mut report, gc_by_size(layout, target, dry_run)?);
    }
    if !dry_run {
        sweep_staging(layout);
    }
    Ok(report)
}

fn merge(into: &mut GcReport, from: GcReport) {
    into.entries_removed += from.entries_removed;
    into.bytes_freed += from.bytes_freed;
    into.deletions.extend(from.deletions);
}

/// Best-effort removal of abandoned `*.staging-*` directories left by
/// crashed captures. Anything younger than [`STAGING_SWEEP_AGE`] may still
/// be in use and is kept.
pub fn sweep_staging(layout: &CacheLayout) -> u64 {
    let store = layout.materializations_dir();
    let mut removed = 0u64;
    let Ok(shards_a) = read_dirs(&store) else {
        return removed;
    };
    for shard_a in shards_a {
        let Ok(shards_b) = read_dirs(&shard_a) else {
            continue;
        };
        for shard_b in shards_b {
            let Ok(children) = read_dirs(&shard_b) else {
                continue;
            };
            for child in children {
                let Some(name) = child.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !name.contains(".staging-") {
                    continue;
                }
                let age = fs::metadata(&child)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|m| SystemTime::now().duration_since(m).ok());
                if age.is_some_and(|a| a > STAGING_SWEEP_AGE) && fs::remove_dir_all(&child).is_ok()
                {
                    removed += 1;
                }
            }
        }
    }
    removed
}
