//! Per-project reuse marker.
//!
//! After a successful install the cache writes a small sentinel into the
//! project's `node_modules` recording which key was materialized. The next
//! invocation compares it against the freshly derived context; on an exact
//! match the whole install short-circuits to a no-op.
//!
//! Mismatches are reported most-specific first: a changed lockfile reports
//! `lock_hash_mismatch` (not the key mismatch it implies), and a changed
//! runtime reports `runtime_fingerprint_mismatch`.

use crate::config::ScriptsMode;
use crate::error::{Error, Reason};
use crate::fingerprint::Fingerprint;
use crate::materialize::LinkStrategy;
use crate::stamp::now_iso;
use better_util::fs::atomic_write;
use better_util::json::stable_json_pretty;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Marker filename inside `node_modules`.
pub const MARKER_FILE: &str = ".better-state.json";

/// Marker schema version.
pub const MARKER_VERSION: u32 = 1;

/// Engine identifier a marker must carry to be trusted.
pub const MARKER_ENGINE: &str = "better";

/// The sentinel recorded after a successful install.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReuseMarker {
    pub version: u32,
    pub engine: String,
    pub global_key: String,
    pub lock_hash: String,
    pub runtime_fingerprint: Fingerprint,
    pub scripts_mode: ScriptsMode,
    pub link_strategy: LinkStrategy,
    pub updated_at: String,
    pub run_id: String,
}

/// What the current invocation expects the marker to record.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerExpectation {
    pub global_key: String,
    pub lock_hash: String,
    pub runtime_fingerprint: Fingerprint,
}

/// Outcome of evaluating a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerVerdict {
    pub hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
}

impl MarkerVerdict {
    fn hit() -> Self {
        Self {
            hit: true,
            reason: None,
        }
    }

    fn miss(reason: Reason) -> Self {
        Self {
            hit: false,
            reason: Some(reason),
        }
    }
}

/// Path of the marker for a project.
#[must_use]
pub fn marker_path(project_root: &Path) -> PathBuf {
    project_root.join("node_modules").join(MARKER_FILE)
}

/// Write the marker, creating `node_modules` if the install left none.
///
/// # Errors
/// Returns an error if the write fails.
pub fn write_marker(project_root: &Path, marker: &ReuseMarker) -> Result<PathBuf, Error> {
    let path = marker_path(project_root);
    let value = serde_json::to_value(marker).map_err(|e| Error::Parse {
        path: path.clone(),
        source: e,
    })?;
    atomic_write(&path, stable_json_pretty(&value).as_bytes())
        .map_err(|e| Error::path_io("write", path.clone(), e))?;
    Ok(path)
}

/// Read the marker back, or `None` when absent or unparseable.
#[must_use]
pub fn read_marker(project_root: &Path) -> Option<ReuseMarker> {
    let bytes = fs::read(marker_path(project_root)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Re-stamp `updatedAt` on an existing marker. This is the only write a
/// no-op install performs inside the project.
///
/// # Errors
/// Returns an error if the rewrite fails.
pub fn touch_marker(project_root: &Path) -> Result<(), Error> {
    let Some(mut marker) = read_marker(project_root) else {
        return Ok(());
    };
    marker.updated_at = now_iso();
    write_marker(project_root, &marker).map(|_| ())
}

/// Evaluate the project's marker against the expected context.
///
/// `expected` is `None` when the caller has no derivable context (e.g. key
/// derivation was ineligible); that is reported as
/// `reuse_context_unavailable`, never as a hit.
#[must_use]
pub fn evaluate_marker(
    project_root: &Path,
    expected: Option<&MarkerExpectation>,
) -> MarkerVerdict {
    let Some(expected) = expected else {
        return MarkerVerdict::miss(Reason::ReuseContextUnavailable);
    };

    let Some(marker) = read_marker(project_root) else {
        return MarkerVerdict::miss(Reason::MarkerMissing);
    };

    if marker.version != MARKER_VERSION {
        return MarkerVerdict::miss(Reason::MarkerVersionMismatch);
    }
    if marker.engine != MARKER_ENGINE {
        return MarkerVerdict::miss(Reason::MarkerEngineMismatch);
    }
    if marker.lock_hash != expected.lock_hash {
        return MarkerVerdict::miss(Reason::LockHashMismatch);
    }
    if !marker
        .runtime_fingerprint
        .structurally_eq(&expected.runtime_fingerprint)
    {
        return MarkerVerdict::miss(Reason::RuntimeFingerprintMismatch);
    }
    if marker.global_key != expected.global_key {
        return MarkerVerdict::miss(Reason::KeyMismatch);
    }

    MarkerVerdict::hit()
}
