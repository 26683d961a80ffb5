//! The state index: a single JSON file of observations about projects,
//! entries, and hit/miss counters.
//!
//! The index is a cache of observations, not a source of truth. Loads
//! tolerate a missing or corrupt file by producing the default skeleton;
//! saves go through write-then-rename so the file on disk is always a fully
//! parseable schema instance. Concurrent writers may clobber each other's
//! updates; nothing correctness-critical reads this file.

use crate::config::{CacheMode, PackageManager};
use crate::error::Error;
use crate::fingerprint::Fingerprint;
use crate::stamp::now_iso;
use better_util::fs::atomic_write;
use better_util::hash::sha256_bytes;
use better_util::json::stable_json_pretty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Schema version of the state file.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// One tracked project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectRecord {
    pub root: String,
    pub last_used_at: String,
    pub pm: String,
}

/// Whether an entry is usable or has been evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Ready,
    Evicted,
}

/// Usage bookkeeping for one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheEntryRecord {
    pub pm: String,
    pub engine: String,
    pub cache_mode: Option<CacheMode>,
    pub lock_hash: String,
    pub fingerprint: Option<Fingerprint>,
    pub created_at: String,
    pub last_used_at: String,
    pub use_count: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub size_bytes: u64,
    pub status: EntryStatus,
}

/// Per-project materialization stamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MaterializationRecord {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_materialized_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_stored_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<String>,
}

/// Global counters across install runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheMetrics {
    pub install_runs: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// GC policy defaults persisted with the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GcPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lru_window_days: Option<u32>,
}

/// The whole persisted index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateIndex {
    pub version: u32,
    pub projects: BTreeMap<String, ProjectRecord>,
    pub cache_entries: BTreeMap<String, CacheEntryRecord>,
    pub materialization_index: BTreeMap<String, MaterializationRecord>,
    pub cache_metrics: CacheMetrics,
    pub gc: GcPolicy,
}

impl Default for StateIndex {
    fn default() -> Self {
        Self {
            version: STATE_SCHEMA_VERSION,
            projects: BTreeMap::new(),
            cache_entries: BTreeMap::new(),
            materialization_index: BTreeMap::new(),
            cache_metrics: CacheMetrics::default(),
            gc: GcPolicy::default(),
        }
    }
}

/// Stable identifier for a project root.
#[must_use]
pub fn project_id(project_root: &Path) -> String {
    sha256_bytes(project_root.display().to_string().as_bytes())[..16].to_string()
}

/// Load the index, producing the default skeleton when the file is absent or
/// unparseable.
#[must_use]
pub fn load(path: &Path) -> StateIndex {
    let Ok(bytes) = std::fs::read(path) else {
        return StateIndex::default();
    };
    serde_json::from_slice(&bytes).unwrap_or_default()
}

/// Persist the index as pretty JSON with stable key ordering,
/// write-then-rename.
///
/// # Errors
/// Returns an error if serialization or the write fails.
pub fn save(path: &Path, index: &StateIndex) -> Result<(), Error> {
    let value = serde_json::to_value(index).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    atomic_write(path, stable_json_pretty(&value).as_bytes())
        .map_err(|e| Error::path_io("write", path.to_path_buf(), e))
}

impl StateIndex {
    /// Record that a project participated in an install run.
    pub fn record_project(&mut self, project_root: &Path, pm: PackageManager) {
        let id = project_id(project_root);
        let record = self.projects.entry(id).or_default();
        record.root = project_root.display().to_string();
        record.pm = pm.as_str().to_string();
        record.last_used_at = now_iso();
    }

    /// Record that an entry was stored (capture) with its observed size.
    pub fn record_entry_stored(
        &mut self,
        derived: &crate::key::EligibleKey,
        project_root: &Path,
        opts: &crate::config::CacheOptions,
        size_bytes: u64,
    ) {
        let now = now_iso();
        let record = self.cache_entries.entry(derived.key.clone()).or_default();
        record.pm = opts.pm.as_str().to_string();
        record.engine = opts.engine.clone();
        record.cache_mode = Some(opts.cache_mode);
        record.lock_hash = derived.lock_hash.clone();
        record.fingerprint = Some(derived.fingerprint.clone());
        if record.created_at.is_empty() {
            record.created_at = now.clone();
        }
        record.last_used_at = now.clone();
        record.use_count += 1;
        record.size_bytes = size_bytes;
        record.status = EntryStatus::Ready;

        let materialization = self
            .materialization_index
            .entry(project_id(project_root))
            .or_default();
        materialization.key = derived.key.clone();
        materialization.last_stored_at = Some(now);
    }

    /// Record a cache hit (restore or marker no-op) for an entry.
    pub fn record_hit(&mut self, key: &str, project_root: &Path, materialized: bool) {
        let now = now_iso();
        self.cache_metrics.install_runs += 1;
        self.cache_metrics.cache_hits += 1;

        let record = self.cache_entries.entry(key.to_string()).or_default();
        record.last_used_at = now.clone();
        record.use_count += 1;
        record.hit_count += 1;

        let materialization = self
            .materialization_index
            .entry(project_id(project_root))
            .or_default();
        materialization.key = key.to_string();
        materialization.last_verified_at = Some(now.clone());
        if materialized {
            materialization.last_materialized_at = Some(now);
        }
    }

    /// Record a cache miss for an entry (the external install ran).
    pub fn record_miss(&mut self, key: &str) {
        self.cache_metrics.install_runs += 1;
        self.cache_metrics.cache_misses += 1;

        let record = self.cache_entries.entry(key.to_string()).or_default();
        record.miss_count += 1;
    }

    /// Record an install run with no cache participation.
    pub fn record_external_run(&mut self) {
        self.cache_metrics.install_runs += 1;
    }

    /// Mark an entry evicted by GC.
    pub fn record_evicted(&mut self, key: &str) {
        if let Some(record) = self.cache_entries.get_mut(key) {
            record.status = EntryStatus::Evicted;
            record.size_bytes = 0;
        }
    }
}
