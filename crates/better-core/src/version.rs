/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Schema version shared by all persisted cache documents (cache key input,
/// entry metadata, reuse marker, state index, lock report).
/// Bump this when changing formats in a way that would break compatibility;
/// bumping it changes every derived key.
pub const SCHEMA_VERSION: u32 = 1;

/// Identifier written into `createdBy` fields of persisted metadata.
#[must_use]
pub fn created_by() -> String {
    format!("better-core/{VERSION}")
}
