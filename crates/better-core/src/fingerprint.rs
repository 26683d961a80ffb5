//! Runtime fingerprinting.
//!
//! The fingerprint is the set of host/runtime attributes that, together with
//! the lockfile digest, determines the cache key. It is an explicit struct:
//! every recognized attribute is a named field, and unknown keys read back
//! from persisted JSON are preserved in `extra` but never produced here.

use crate::config::{CacheMode, CacheOptions, ScriptsMode};
use better_util::json::hash_value;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Observed attributes of the host this process runs on.
///
/// Platform and arch use node-ecosystem names (`linux`/`darwin`/`win32`,
/// `x64`/`arm64`) so keys line up with what the JavaScript side of the
/// toolchain reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub platform: String,
    pub arch: String,
    /// Node major version, if the caller probed one.
    pub node_major: Option<u32>,
    /// `glibc-<version>` when detectable, `linux-unknown-libc` on other
    /// Linux hosts, `n/a` elsewhere.
    pub libc: String,
}

impl Host {
    /// Detect the current host. The node major version comes from the
    /// caller; the core never spawns `node` to ask.
    #[must_use]
    pub fn detect(node_major: Option<u32>) -> Self {
        Self {
            platform: node_platform().to_string(),
            arch: node_arch().to_string(),
            node_major,
            libc: detect_libc(),
        }
    }
}

fn node_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

fn node_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        other => other,
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn detect_libc() -> String {
    // SAFETY: gnu_get_libc_version returns a pointer to a static
    // NUL-terminated string owned by glibc.
    let version = unsafe { std::ffi::CStr::from_ptr(libc::gnu_get_libc_version()) };
    match version.to_str() {
        Ok(v) if !v.is_empty() => format!("glibc-{v}"),
        _ => String::from("linux-unknown-libc"),
    }
}

#[cfg(all(target_os = "linux", not(target_env = "gnu")))]
fn detect_libc() -> String {
    String::from("linux-unknown-libc")
}

#[cfg(not(target_os = "linux"))]
fn detect_libc() -> String {
    String::from("n/a")
}

/// The runtime fingerprint that participates in key derivation.
///
/// In `strict` mode every field is populated; in `relaxed` mode only the
/// platform-independent subset (platform, arch, pm, engine, scriptsMode,
/// cacheKeySalt) is, and the rest serialize as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub platform: String,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_major: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libc: Option<String>,
    pub pm: String,
    pub engine: String,
    pub scripts_mode: ScriptsMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<bool>,
    /// Always present (as `null` when unset) so salted and unsalted keys
    /// differ even for empty salts.
    pub cache_key_salt: Option<String>,
    /// Unrecognized keys from persisted fingerprints, preserved for
    /// structural comparison. The core never adds keys here; an empty map
    /// contributes no keys to the serialized form.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Fingerprint {
    /// Build the fingerprint for the given cache mode.
    #[must_use]
    pub fn for_mode(mode: CacheMode, host: &Host, opts: &CacheOptions) -> Self {
        let mut fp = Self {
            platform: host.platform.clone(),
            arch: host.arch.clone(),
            node_major: None,
            libc: None,
            pm: opts.pm.as_str().to_string(),
            engine: opts.engine.clone(),
            scripts_mode: opts.scripts_mode,
            frozen: None,
            production: None,
            cache_key_salt: opts.cache_key_salt.clone(),
            extra: BTreeMap::new(),
        };
        if mode == CacheMode::Strict {
            fp.node_major = host.node_major;
            fp.libc = Some(host.libc.clone());
            fp.frozen = Some(opts.frozen);
            fp.production = Some(opts.production);
        }
        fp
    }

    /// This fingerprint as a JSON value (camelCase keys).
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Structural equality after stable key re-ordering: two fingerprints
    /// are the same iff their canonical encodings are byte-identical.
    #[must_use]
    pub fn structurally_eq(&self, other: &Self) -> bool {
        hash_value(&self.to_value()) == hash_value(&other.to_value())
    }
}
