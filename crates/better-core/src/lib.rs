#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]

//! Core of better: the global materialization cache.
//!
//! Provides:
//! - Cache key derivation from a lockfile digest plus a runtime fingerprint
//! - A content-addressed on-disk store of fully-installed `node_modules`
//!   trees with atomic publish (capture) and retrieval (restore)
//! - Hardlink-first materialization with per-file copy fallback
//! - Per-project reuse markers for no-op installs
//! - A tolerant JSON state index of usage observations
//! - Age- and size-capped garbage collection with LRU ordering
//!
//! The core never resolves dependencies, talks to registries, or spawns
//! processes; the real install is delegated through
//! [`install::InstallDelegate`].

pub mod capture;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod gc;
pub mod install;
pub mod key;
pub mod layout;
pub mod marker;
pub mod materialize;
pub mod restore;
pub mod scan;
pub mod stamp;
pub mod state;
pub mod store;
pub mod version;

pub use capture::{capture, CaptureReport};
pub use config::{CacheMode, CacheOptions, PackageManager, ScriptsMode};
pub use error::{Error, Failure, Reason};
pub use fingerprint::{Fingerprint, Host};
pub use gc::{gc_by_age, gc_by_size, run_gc, GcReport};
pub use install::{run_install, InstallDelegate, InstallError, InstallPath, InstallReport};
pub use key::{derive_key, is_valid_key, lock_report, EligibleKey, KeyDerivation, LockfileRef};
pub use layout::{CacheLayout, CACHE_ROOT_ENV};
pub use marker::{
    evaluate_marker, write_marker, MarkerExpectation, MarkerVerdict, ReuseMarker, MARKER_FILE,
};
pub use materialize::{
    materialize_tree, CancelToken, LinkStrategy, MaterializeStats, DEFAULT_FS_CONCURRENCY,
};
pub use restore::{restore, RestoreReport};
pub use scan::{scan_tree, ScanTotals};
pub use state::{GcPolicy, StateIndex};
pub use store::{read_meta, verify_entry, EntryMeta, VerifyOutcome};
pub use version::{SCHEMA_VERSION, VERSION};
