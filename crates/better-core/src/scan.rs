//! Hardlink-aware directory sizing.
//!
//! Walks a tree and reports logical bytes (every path's length), physical
//! bytes (each `(dev, ino)` identity counted once), and entry counts. Used
//! by GC for eviction ordering and by status reporting.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

/// Totals from one tree scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanTotals {
    pub logical_bytes: u64,
    pub physical_bytes: u64,
    pub file_count: u64,
    pub dir_count: u64,
    pub symlink_count: u64,
    /// Set when hardlink identity could not be derived from inode data and
    /// physical bytes were attributed per-path instead.
    pub physical_bytes_approx: bool,
}

/// Scan a directory tree.
///
/// A missing root yields zero totals; walk order is lexicographic per
/// directory so repeated scans observe files in the same order. Symlinks are
/// counted by their own (lstat) size and never followed.
///
/// # Errors
/// Returns an error if the walk encounters an I/O failure below an existing
/// root.
pub fn scan_tree(root: &Path) -> Result<ScanTotals, Error> {
    let mut totals = ScanTotals::default();
    if !root.exists() {
        return Ok(totals);
    }

    let mut seen: HashSet<(u64, u64)> = HashSet::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map_or_else(|| root.to_path_buf(), Path::to_path_buf);
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walk failed"));
            Error::path_io("walk", path, io)
        })?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
            totals.dir_count += 1;
            continue;
        }

        let meta = entry
            .metadata()
            .map_err(|e| {
                let io = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("stat failed"));
                Error::path_io("stat", entry.path().to_path_buf(), io)
            })?;

        if file_type.is_symlink() {
            totals.symlink_count += 1;
            totals.logical_bytes += meta.len().max(1);
            totals.physical_bytes += meta.len().max(1);
            continue;
        }

        totals.file_count += 1;
        totals.logical_bytes += meta.len();

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if meta.nlink() > 1 {
                // Attribute physical bytes to the first occurrence of this
                // inode within the scan.
                if seen.insert((meta.dev(), meta.ino())) {
                    totals.physical_bytes += meta.len();
                }
            } else {
                totals.physical_bytes += meta.len();
            }
        }

        #[cfg(not(unix))]
        {
            let _ = &mut seen;
            totals.physical_bytes += meta.len();
            totals.physical_bytes_approx = true;
        }
    }

    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_missing_root_is_zero() {
        let dir = tempdir().unwrap();
        let totals = scan_tree(&dir.path().join("absent")).unwrap();
        assert_eq!(totals, ScanTotals::default());
    }

    #[test]
    fn test_counts_files_and_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.txt"), b"12345").unwrap();
        fs::write(dir.path().join("sub").join("b.txt"), b"123").unwrap();

        let totals = scan_tree(dir.path()).unwrap();
        assert_eq!(totals.file_count, 2);
        assert_eq!(totals.dir_count, 2); // root + sub
        assert_eq!(totals.logical_bytes, 8);
        assert_eq!(totals.physical_bytes, 8);
    }

    #[cfg(unix)]
    #[test]
    fn test_hardlinks_deduped_in_physical_bytes() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("original.bin");
        fs::write(&original, vec![0u8; 1000]).unwrap();
        fs::hard_link(&original, dir.path().join("link1.bin")).unwrap();
        fs::hard_link(&original, dir.path().join("link2.bin")).unwrap();

        let totals = scan_tree(dir.path()).unwrap();
        assert_eq!(totals.file_count, 3);
        assert_eq!(totals.logical_bytes, 3000);
        assert_eq!(totals.physical_bytes, 1000);
        assert!(!totals.physical_bytes_approx);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("target.txt"), vec![0u8; 500]).unwrap();
        std::os::unix::fs::symlink("target.txt", dir.path().join("alias")).unwrap();

        let totals = scan_tree(dir.path()).unwrap();
        assert_eq!(totals.file_count, 1);
        assert_eq!(totals.symlink_count, 1);
        // The symlink contributes its own small size, not the target's.
        assert!(totals.logical_bytes < 600);
    }
}
