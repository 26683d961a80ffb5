//! Timestamps and unique suffixes for staging paths and run ids.

use chrono::{SecondsFormat, Utc};

/// Current time as an RFC 3339 UTC string with millisecond precision.
#[must_use]
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A unique suffix for staging directory names: `<millis>-<random>`.
///
/// Uniqueness only has to hold between concurrent invocations on one host;
/// the final rename is what publishes, so a collision would merely retry
/// work, never corrupt an entry.
#[must_use]
pub fn unique_suffix() -> String {
    format!("{}-{:016x}", now_millis(), rand_u64())
}

/// A run identifier recorded in reuse markers: `<pid>-<millis>-<random>`.
#[must_use]
pub fn new_run_id() -> String {
    format!("{}-{}-{:08x}", std::process::id(), now_millis(), rand_u64() as u32)
}

/// Cheap randomness for temp names; not cryptographic.
fn rand_u64() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
    );
    hasher.write_u32(std::process::id());
    hasher.finish()
}
