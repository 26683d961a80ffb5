//! Cache root resolution and on-disk layout.
//!
//! Everything the cache persists lives under one root directory:
//!
//! ```text
//! <cacheRoot>/
//!   state.json
//!   runs/                      (consumers only)
//!   analyses/                  (consumers only)
//!   tmp/
//!   store/
//!     tarballs/                (consumers only)
//!     unpacked/                (consumers only)
//!     materializations/<AA>/<BB>/<key>/{entry.json, node_modules/}
//!     tmp/
//! ```
//!
//! The root is chosen by precedence: explicit argument, the
//! `BETTER_CACHE_ROOT` environment variable, the OS cache directory. If the
//! chosen root is not writable the layout falls back to
//! `<projectRoot>/.better/cache` and records that it did.

use crate::error::Error;
use crate::key::is_valid_key;
use crate::stamp::unique_suffix;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root.
pub const CACHE_ROOT_ENV: &str = "BETTER_CACHE_ROOT";

/// Name of the state index file under the cache root.
pub const STATE_FILE_NAME: &str = "state.json";

/// Absolute paths of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPaths {
    /// `<root>/store/materializations/<AA>/<BB>/<key>`
    pub root: PathBuf,
    /// `<entry>/entry.json`
    pub meta_file: PathBuf,
    /// `<entry>/node_modules`
    pub node_modules: PathBuf,
}

/// Resolved cache layout. Operations receive this instead of consulting
/// globals; there is no module-level mutable state.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
    fell_back: bool,
}

impl CacheLayout {
    /// Use an exact root without writability probing. Intended for tests and
    /// for callers that already validated the path.
    #[must_use]
    pub fn at_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fell_back: false,
        }
    }

    /// Resolve the cache root by precedence, falling back to a per-project
    /// cache when the preferred root is not writable.
    #[must_use]
    pub fn resolve(explicit: Option<&Path>, project_root: &Path) -> Self {
        let preferred = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CACHE_ROOT_ENV).map(PathBuf::from))
            .unwrap_or_else(os_default_root);

        if is_writable(&preferred) {
            Self {
                root: preferred,
                fell_back: false,
            }
        } else {
            Self {
                root: project_root.join(".better").join("cache"),
                fell_back: true,
            }
        }
    }

    /// The cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether resolution fell back to the per-project cache directory.
    #[must_use]
    pub fn fell_back(&self) -> bool {
        self.fell_back
    }

    /// `<root>/state.json`
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE_NAME)
    }

    /// `<root>/tmp` — staging scratch.
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// `<root>/store`
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    /// `<root>/store/tmp`
    #[must_use]
    pub fn store_tmp_dir(&self) -> PathBuf {
        self.store_dir().join("tmp")
    }

    /// `<root>/store/materializations`
    #[must_use]
    pub fn materializations_dir(&self) -> PathBuf {
        self.store_dir().join("materializations")
    }

    /// The two-level shard directory for a key: `<AA>/<BB>` from the first
    /// four hex characters. Sharding bounds per-directory fanout.
    ///
    /// # Panics
    /// Panics if `key` is not a 64-character lowercase hex string; callers
    /// validate keys at the boundary.
    #[must_use]
    pub fn entry_shard_dir(&self, key: &str) -> PathBuf {
        assert!(is_valid_key(key), "malformed cache key: {key}");
        self.materializations_dir().join(&key[0..2]).join(&key[2..4])
    }

    /// Absolute paths of the entry for `key`.
    ///
    /// # Panics
    /// Panics if `key` is not a 64-character lowercase hex string.
    #[must_use]
    pub fn entry_paths(&self, key: &str) -> EntryPaths {
        let root = self.entry_shard_dir(key).join(key);
        EntryPaths {
            meta_file: root.join(crate::store::ENTRY_META_FILE),
            node_modules: root.join("node_modules"),
            root,
        }
    }

    /// Create the directory scaffold under the root.
    ///
    /// # Errors
    /// Returns an error if a directory cannot be created.
    pub fn ensure_scaffold(&self) -> Result<(), Error> {
        for dir in [
            self.root.clone(),
            self.root.join("runs"),
            self.root.join("analyses"),
            self.tmp_dir(),
            self.store_dir(),
            self.store_dir().join("tarballs"),
            self.store_dir().join("unpacked"),
            self.store_tmp_dir(),
            self.materializations_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| Error::path_io("create_dir", dir.clone(), e))?;
        }
        Ok(())
    }
}

/// OS default cache root: `~/Library/Caches/better` on macOS,
/// `%LOCALAPPDATA%/better/cache` on Windows, `$XDG_CACHE_HOME/better` or
/// `~/.cache/better` on Linux.
fn os_default_root() -> PathBuf {
    let base = dirs_next::cache_dir().map_or_else(
        || {
            dirs_next::home_dir().map_or_else(
                || PathBuf::from(".better-cache"),
                |p| p.join(".cache").join("better"),
            )
        },
        |p| p.join("better"),
    );

    if cfg!(windows) {
        base.join("cache")
    } else {
        base
    }
}

/// Probe writability by creating the directory and a scratch file in it.
fn is_writable(dir: &Path) -> bool {
    if fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(format!(".write-probe-{}", unique_suffix()));
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    const KEY: &str = "aabbccddeeff00112233445566778899aabbccddeeff00112233445566778899";

    #[test]
    fn test_entry_paths_sharding() {
        let layout = CacheLayout::at_root("/cache");
        let paths = layout.entry_paths(KEY);
        let expected = Path::new("/cache")
            .join("store")
            .join("materializations")
            .join("aa")
            .join("bb")
            .join(KEY);
        assert_eq!(paths.root, expected);
        assert_eq!(paths.meta_file, expected.join("entry.json"));
        assert_eq!(paths.node_modules, expected.join("node_modules"));
    }

    #[test]
    #[should_panic(expected = "malformed cache key")]
    fn test_entry_paths_rejects_bad_key() {
        let layout = CacheLayout::at_root("/cache");
        let _ = layout.entry_paths("not-a-key");
    }

    #[test]
    #[serial]
    fn test_resolve_env_override() {
        let dir = tempdir().unwrap();
        std::env::set_var(CACHE_ROOT_ENV, dir.path());

        let layout = CacheLayout::resolve(None, Path::new("/project"));
        assert_eq!(layout.root(), dir.path());
        assert!(!layout.fell_back());

        std::env::remove_var(CACHE_ROOT_ENV);
    }

    #[test]
    #[serial]
    fn test_resolve_explicit_beats_env() {
        let env_dir = tempdir().unwrap();
        let arg_dir = tempdir().unwrap();
        std::env::set_var(CACHE_ROOT_ENV, env_dir.path());

        let layout = CacheLayout::resolve(Some(arg_dir.path()), Path::new("/project"));
        assert_eq!(layout.root(), arg_dir.path());

        std::env::remove_var(CACHE_ROOT_ENV);
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_resolve_falls_back_when_unwritable() {
        use std::os::unix::fs::PermissionsExt;

        let blocked = tempdir().unwrap();
        let mut perms = std::fs::metadata(blocked.path()).unwrap().permissions();
        perms.set_mode(0o555);
        std::fs::set_permissions(blocked.path(), perms.clone()).unwrap();

        let project = tempdir().unwrap();
        let target = blocked.path().join("sub");
        let layout = CacheLayout::resolve(Some(&target), project.path());

        perms.set_mode(0o755);
        std::fs::set_permissions(blocked.path(), perms).unwrap();

        assert!(layout.fell_back());
        assert_eq!(
            layout.root(),
            project.path().join(".better").join("cache")
        );
    }

    #[test]
    fn test_scaffold_creates_layout() {
        let dir = tempdir().unwrap();
        let layout = CacheLayout::at_root(dir.path());
        layout.ensure_scaffold().unwrap();

        assert!(layout.materializations_dir().is_dir());
        assert!(layout.tmp_dir().is_dir());
        assert!(layout.store_tmp_dir().is_dir());
    }
}
