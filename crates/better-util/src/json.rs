//! Canonical JSON encoding.
//!
//! Documents that participate in hashing (cache keys, fingerprints) must
//! serialize identically regardless of how their in-memory representation was
//! built. The canonical form sorts every object's keys lexicographically,
//! preserves array order, and uses the minimal decimal form for numbers.

use serde_json::Value;

use crate::hash::sha256_bytes;

/// Encode a JSON value canonically: object keys sorted lexicographically,
/// arrays in order, compact separators, no trailing newline.
#[must_use]
pub fn stable_json(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

/// Encode a JSON value as pretty-printed text with sorted object keys and a
/// trailing newline. Used for files meant to be inspected by humans
/// (entry metadata, the state index).
#[must_use]
pub fn stable_json_pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(&sorted(value))
        .unwrap_or_else(|_| String::from("null"));
    text.push('\n');
    text
}

/// Compute the SHA-256 hash of the canonical encoding of a JSON value.
#[must_use]
pub fn hash_value(value: &Value) -> String {
    sha256_bytes(&stable_json(value))
}

/// Rebuild a value with every object converted to sorted-key form.
///
/// `serde_json`'s default map is already ordered by key, but rebuilding keeps
/// the canonical guarantee independent of which map backing was compiled in.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            let mut out = serde_json::Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String((*key).clone()), out);
                out.push(b':');
                write_canonical(&map[*key], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        other => write_scalar(other, out),
    }
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) {
    // serde_json already emits minimal decimals for numbers and standard
    // escapes for strings.
    if let Ok(bytes) = serde_json::to_vec(value) {
        out.extend_from_slice(&bytes);
    }
}
