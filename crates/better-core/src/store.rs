//! On-disk entry store.
//!
//! An entry is a directory under the sharded materializations tree holding a
//! complete `node_modules/` and an `entry.json` sidecar. An entry is valid
//! iff both are present; publication is atomic (staging + rename), so
//! readers never observe a partial entry.

use crate::config::{CacheMode, ScriptsMode};
use crate::error::{Error, Reason};
use crate::fingerprint::Fingerprint;
use crate::key::LockfileRef;
use crate::layout::CacheLayout;
use crate::materialize::MaterializeStats;
use better_util::json::stable_json_pretty;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Filename of the metadata sidecar inside an entry.
pub const ENTRY_META_FILE: &str = "entry.json";

/// Metadata recorded alongside a materialized tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMeta {
    pub key: String,
    pub created_at: String,
    pub created_by: String,
    pub source_project_root: String,
    pub lock_hash: String,
    pub lockfile: LockfileRef,
    pub fingerprint: Fingerprint,
    pub pm: String,
    pub engine: String,
    pub scripts_mode: ScriptsMode,
    pub cache_mode: CacheMode,
    pub stats: MaterializeStats,
}

/// Result of verifying an entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<EntryMeta>,
}

impl VerifyOutcome {
    fn ok(meta: EntryMeta) -> Self {
        Self {
            ok: true,
            reason: None,
            meta: Some(meta),
        }
    }

    fn invalid(reason: Reason) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            meta: None,
        }
    }
}

/// Verify that the entry for `key` is complete: `node_modules/` exists and
/// `entry.json` parses.
#[must_use]
pub fn verify_entry(layout: &CacheLayout, key: &str) -> VerifyOutcome {
    let paths = layout.entry_paths(key);

    if !paths.node_modules.is_dir() {
        return VerifyOutcome::invalid(Reason::EntryNodeModulesMissing);
    }

    match read_meta_file(&paths.meta_file) {
        Some(meta) => VerifyOutcome::ok(meta),
        None => VerifyOutcome::invalid(Reason::EntryMetaMissing),
    }
}

/// Read an entry's metadata, or `None` when absent or unparseable.
#[must_use]
pub fn read_meta(layout: &CacheLayout, key: &str) -> Option<EntryMeta> {
    read_meta_file(&layout.entry_paths(key).meta_file)
}

fn read_meta_file(path: &Path) -> Option<EntryMeta> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Write entry metadata: pretty JSON with stable key ordering and a trailing
/// newline.
///
/// # Errors
/// Returns an error if serialization or the write fails.
pub fn write_meta(path: &Path, meta: &EntryMeta) -> Result<(), Error> {
    let value = serde_json::to_value(meta).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    fs::write(path, stable_json_pretty(&value))
        .map_err(|e| Error::path_io("write", path.to_path_buf(), e))
}
