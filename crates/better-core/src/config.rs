//! Cache options: the enumerated bag of knobs that participates in key
//! derivation and materialization.
//!
//! Every field here is explicit. Adding a knob that should affect the cache
//! key requires adding a field and bumping the key schema version; there is
//! no dynamic option map to silently widen the fingerprint.

use crate::materialize::{LinkStrategy, DEFAULT_FS_CONCURRENCY};
use serde::{Deserialize, Serialize};

/// The underlying package manager whose install is being cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }

    /// Parse a package manager name. Unknown names fall back to npm.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "pnpm" => Self::Pnpm,
            "yarn" => Self::Yarn,
            "bun" => Self::Bun,
            _ => Self::Npm,
        }
    }
}

/// How much of the runtime fingerprint participates in the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Full fingerprint: platform, arch, node major, libc, flags.
    #[default]
    Strict,
    /// Platform-independent subset, for teams sharing a cache volume across
    /// similar hosts.
    Relaxed,
}

impl CacheMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Relaxed => "relaxed",
        }
    }

    /// Parse a mode name. Unknown names fall back to strict.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "relaxed" => Self::Relaxed,
            _ => Self::Strict,
        }
    }
}

/// What happens to lifecycle scripts after a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScriptsMode {
    /// Re-run `rebuild` for native modules after materialization.
    #[default]
    Rebuild,
    /// Trust the cached tree as-is.
    Skip,
}

impl ScriptsMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rebuild => "rebuild",
            Self::Skip => "skip",
        }
    }

    /// Parse a mode name. Unknown names fall back to rebuild.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "skip" => Self::Skip,
            _ => Self::Rebuild,
        }
    }
}

/// Options for one cache invocation.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// The package manager that produces/consumes `node_modules`.
    pub pm: PackageManager,
    /// The install engine identifier recorded in markers and metadata.
    pub engine: String,
    pub cache_mode: CacheMode,
    pub scripts_mode: ScriptsMode,
    /// Whether the install was requested with a frozen lockfile.
    pub frozen: bool,
    /// Whether dev dependencies were excluded.
    pub production: bool,
    /// Opaque salt mixed into the key, for cache-busting.
    pub cache_key_salt: Option<String>,
    /// Node major version, supplied by the caller (the core never spawns
    /// `node`). Absent on hosts where it could not be probed.
    pub node_major: Option<u32>,
    pub link_strategy: LinkStrategy,
    /// Bounded worker count for file operations, clamped to 1..=128.
    pub fs_concurrency: usize,
    /// When set, Capture is skipped; the cache is never written.
    pub cache_read_only: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            pm: PackageManager::default(),
            engine: String::from("better"),
            cache_mode: CacheMode::default(),
            scripts_mode: ScriptsMode::default(),
            frozen: false,
            production: false,
            cache_key_salt: None,
            node_major: None,
            link_strategy: LinkStrategy::default(),
            fs_concurrency: DEFAULT_FS_CONCURRENCY,
            cache_read_only: false,
        }
    }
}

impl CacheOptions {
    /// Set the package manager.
    #[must_use]
    pub fn with_pm(mut self, pm: PackageManager) -> Self {
        self.pm = pm;
        self
    }

    /// Set the cache mode.
    #[must_use]
    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Set the scripts mode.
    #[must_use]
    pub fn with_scripts_mode(mut self, mode: ScriptsMode) -> Self {
        self.scripts_mode = mode;
        self
    }

    /// Set the link strategy.
    #[must_use]
    pub fn with_link_strategy(mut self, strategy: LinkStrategy) -> Self {
        self.link_strategy = strategy;
        self
    }

    /// Set the cache key salt.
    #[must_use]
    pub fn with_salt(mut self, salt: Option<String>) -> Self {
        self.cache_key_salt = salt;
        self
    }

    /// Set the node major version.
    #[must_use]
    pub fn with_node_major(mut self, major: Option<u32>) -> Self {
        self.node_major = major;
        self
    }
}
