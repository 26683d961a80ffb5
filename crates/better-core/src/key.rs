//! Cache key derivation.
//!
//! The key is a pure function of `(cacheMode, lockHash, fingerprint)`:
//! the SHA-256 of the canonical encoding of
//! `{ version, cacheMode, lockHash, fingerprint }`. Same inputs produce the
//! same key on any host, which is what lets independent processes and
//! machines agree on entry identity without coordination.

use crate::config::CacheOptions;
use crate::error::{Error, Reason};
use crate::fingerprint::{Fingerprint, Host};
use crate::stamp::now_iso;
use crate::version::SCHEMA_VERSION;
use better_util::hash::sha256_file;
use better_util::json::hash_value;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};

/// The lockfile a key was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockfileRef {
    /// Filename relative to the project root, e.g. `package-lock.json`.
    pub file: String,
    /// SHA-256 of the raw lockfile bytes.
    pub hash: String,
}

/// A successfully derived cache key and its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibleKey {
    /// 64-hex entry identifier.
    pub key: String,
    pub lock_hash: String,
    pub lockfile: LockfileRef,
    pub fingerprint: Fingerprint,
}

/// Outcome of key derivation. Ineligibility is a decision, not an error:
/// a project without a lockfile simply cannot participate in the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyDerivation {
    Eligible(Box<EligibleKey>),
    Ineligible(Reason),
}

impl KeyDerivation {
    /// The derived key, when eligible.
    #[must_use]
    pub fn eligible(&self) -> Option<&EligibleKey> {
        match self {
            Self::Eligible(derived) => Some(derived),
            Self::Ineligible(_) => None,
        }
    }
}

/// Whether a string is a well-formed cache key: 64 lowercase hex characters.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    key.len() == 64
        && key
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Lockfile precedence per package manager. First existing file wins.
fn lockfile_candidates(pm: crate::config::PackageManager) -> &'static [&'static str] {
    use crate::config::PackageManager;
    match pm {
        PackageManager::Bun => &["bun.lock", "bun.lockb"],
        PackageManager::Pnpm => &["pnpm-lock.yaml"],
        PackageManager::Yarn => &["yarn.lock"],
        PackageManager::Npm => &["package-lock.json", "npm-shrinkwrap.json"],
    }
}

/// Find the primary lockfile for the project, by precedence.
#[must_use]
pub fn find_lockfile(
    project_root: &Path,
    pm: crate::config::PackageManager,
) -> Option<(String, PathBuf)> {
    for name in lockfile_candidates(pm) {
        let path = project_root.join(name);
        if path.is_file() {
            return Some(((*name).to_string(), path));
        }
    }
    None
}

/// Derive the cache key for a project.
///
/// # Errors
/// Returns an error only for I/O failures while hashing an existing
/// lockfile. A missing lockfile is reported as
/// [`KeyDerivation::Ineligible`], not an error.
pub fn derive_key(
    project_root: &Path,
    host: &Host,
    opts: &CacheOptions,
) -> Result<KeyDerivation, Error> {
    let Some((file, path)) = find_lockfile(project_root, opts.pm) else {
        return Ok(KeyDerivation::Ineligible(Reason::LockfileNotFound));
    };

    let lock_hash = sha256_file(&path).map_err(|e| Error::path_io("hash", path.clone(), e))?;
    let fingerprint = Fingerprint::for_mode(opts.cache_mode, host, opts);

    let key = hash_value(&json!({
        "version": SCHEMA_VERSION,
        "cacheMode": opts.cache_mode.as_str(),
        "lockHash": lock_hash,
        "fingerprint": fingerprint.to_value(),
    }));

    Ok(KeyDerivation::Eligible(Box::new(EligibleKey {
        key,
        lockfile: LockfileRef {
            file,
            hash: lock_hash.clone(),
        },
        lock_hash,
        fingerprint,
    })))
}

/// The serialized key document another tool can use to verify a derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockReport {
    pub kind: String,
    pub schema_version: u32,
    pub generated_at: String,
    pub project_root: String,
    pub pm: String,
    pub engine: String,
    pub cache_mode: String,
    pub scripts_mode: String,
    pub frozen: bool,
    pub production: bool,
    pub lockfile: LockfileRef,
    pub fingerprint: Fingerprint,
    pub key: String,
}

/// Build the `better.lock` report for a derived key.
#[must_use]
pub fn lock_report(project_root: &Path, derived: &EligibleKey, opts: &CacheOptions) -> LockReport {
    LockReport {
        kind: String::from("better.lock"),
        schema_version: SCHEMA_VERSION,
        generated_at: now_iso(),
        project_root: project_root.display().to_string(),
        pm: opts.pm.as_str().to_string(),
        engine: opts.engine.clone(),
        cache_mode: opts.cache_mode.as_str().to_string(),
        scripts_mode: opts.scripts_mode.as_str().to_string(),
        frozen: opts.frozen,
        production: opts.production,
        lockfile: derived.lockfile.clone(),
        fingerprint: derived.fingerprint.clone(),
        key: derived.key.clone(),
    }
}
