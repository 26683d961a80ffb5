//! Error and reason types for cache operations.
//!
//! The core distinguishes two failure shapes:
//!
//! - [`Error`] carries an underlying I/O or parse failure with the offending
//!   path and operation, for callers that want the full chain.
//! - [`Failure`] is the structured outcome of a data-plane operation: a
//!   machine-readable [`Reason`] plus a human-readable message. Callers
//!   translate reasons to exit codes or UI strings.
//!
//! Ineligibility (no lockfile, no reuse context) is a decision, not an
//! error; it is reported through outcome structs rather than raised.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for I/O and parse failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{op} failed for {path}: {source}")]
    PathIo {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn path_io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PathIo {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Machine-readable reason attached to outcomes and failures.
///
/// Serializes to the snake_case strings used in JSON output, e.g.
/// `entry_node_modules_missing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    // Ineligibility
    LockfileNotFound,
    ReuseContextUnavailable,

    // Integrity / verification
    EntryNodeModulesMissing,
    EntryMetaMissing,
    MarkerMissing,
    MarkerVersionMismatch,
    MarkerEngineMismatch,
    KeyMismatch,
    LockHashMismatch,
    RuntimeFingerprintMismatch,

    // I/O
    NodeModulesMissing,
    MaterializeFailed,
    RenameFailed,
    PermissionDenied,

    // Policy
    CacheReadOnly,

    // Index
    StateWriteFailed,
}

impl Reason {
    /// The snake_case wire form of this reason.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LockfileNotFound => "lockfile_not_found",
            Self::ReuseContextUnavailable => "reuse_context_unavailable",
            Self::EntryNodeModulesMissing => "entry_node_modules_missing",
            Self::EntryMetaMissing => "entry_meta_missing",
            Self::MarkerMissing => "marker_missing",
            Self::MarkerVersionMismatch => "marker_version_mismatch",
            Self::MarkerEngineMismatch => "marker_engine_mismatch",
            Self::KeyMismatch => "key_mismatch",
            Self::LockHashMismatch => "lock_hash_mismatch",
            Self::RuntimeFingerprintMismatch => "runtime_fingerprint_mismatch",
            Self::NodeModulesMissing => "node_modules_missing",
            Self::MaterializeFailed => "materialize_failed",
            Self::RenameFailed => "rename_failed",
            Self::PermissionDenied => "permission_denied",
            Self::CacheReadOnly => "cache_read_only",
            Self::StateWriteFailed => "state_write_failed",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed data-plane operation: reason plus enough context to act.
#[derive(Error, Debug)]
#[error("{reason}: {message}")]
pub struct Failure {
    pub reason: Reason,
    pub message: String,
}

impl Failure {
    /// Create a new failure with the given reason and message.
    #[must_use]
    pub fn new(reason: Reason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    /// Wrap an I/O-level error, mapping permission errors to their own reason.
    #[must_use]
    pub fn io(fallback: Reason, op: &'static str, path: &std::path::Path, err: &std::io::Error) -> Self {
        let reason = if err.kind() == std::io::ErrorKind::PermissionDenied {
            Reason::PermissionDenied
        } else {
            fallback
        };
        Self::new(reason, format!("{op} failed for {}: {err}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_wire_form_is_snake_case() {
        assert_eq!(Reason::LockfileNotFound.as_str(), "lockfile_not_found");
        assert_eq!(
            Reason::EntryNodeModulesMissing.as_str(),
            "entry_node_modules_missing"
        );
        assert_eq!(
            Reason::RuntimeFingerprintMismatch.as_str(),
            "runtime_fingerprint_mismatch"
        );
    }

    #[test]
    fn test_reason_serde_matches_as_str() {
        let all = [
            Reason::LockfileNotFound,
            Reason::ReuseContextUnavailable,
            Reason::EntryNodeModulesMissing,
            Reason::EntryMetaMissing,
            Reason::MarkerMissing,
            Reason::MarkerVersionMismatch,
            Reason::MarkerEngineMismatch,
            Reason::KeyMismatch,
            Reason::LockHashMismatch,
            Reason::RuntimeFingerprintMismatch,
            Reason::NodeModulesMissing,
            Reason::MaterializeFailed,
            Reason::RenameFailed,
            Reason::PermissionDenied,
            Reason::CacheReadOnly,
            Reason::StateWriteFailed,
        ];
        for reason in all {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
    }

    #[test]
    fn test_failure_display_contains_reason() {
        let failure = Failure::new(Reason::RenameFailed, "target busy");
        let text = failure.to_string();
        assert!(text.contains("rename_failed"));
        assert!(text.contains("target busy"));
    }
}
