//! SHA-256 digests as lowercase 64-hex strings.
//!
//! Cache keys and lockfile digests both use this encoding; file hashing
//! reads raw bytes with no normalization, so any byte-level change to a
//! lockfile produces a different digest.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Drain a reader into a SHA-256 hasher and hex-encode the digest.
///
/// `Sha256` is an `io::Write` sink, so `io::copy` does the buffering; file
/// contents are never held in memory as a whole.
fn hex_digest(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of a file's raw bytes, streamed.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    hex_digest(File::open(path)?)
}

/// SHA-256 of an in-memory byte slice.
#[must_use]
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    // SHA-256 of the empty input, from the FIPS 180-4 test vectors.
    const EMPTY_DIGEST: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_empty_input_matches_known_vector() {
        assert_eq!(sha256_bytes(b""), EMPTY_DIGEST);

        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), EMPTY_DIGEST);
    }

    #[test]
    fn test_file_and_bytes_agree() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock.json");
        let contents = b"{\"lockfileVersion\": 3}";
        fs::write(&path, contents).unwrap();

        assert_eq!(sha256_file(&path).unwrap(), sha256_bytes(contents));
    }

    #[test]
    fn test_streaming_matches_for_multi_chunk_input() {
        // Larger than any internal copy buffer, so the file path exercises
        // more than one read.
        let contents: Vec<u8> = (0..128 * 1024).map(|i| (i % 251) as u8).collect();

        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        fs::write(&path, &contents).unwrap();

        assert_eq!(sha256_file(&path).unwrap(), sha256_bytes(&contents));
    }

    #[test]
    fn test_digest_shape() {
        let digest = sha256_bytes(b"anything");
        assert_eq!(digest.len(), 64);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_byte_change_changes_digest() {
        assert_ne!(sha256_bytes(b"lockfile v1"), sha256_bytes(b"lockfile v2"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(sha256_file(&dir.path().join("absent")).is_err());
    }
}
