//! Tree materialization: reproduce a source directory at a destination via
//! hardlinks, copies, or hardlink-with-copy-fallback.
//!
//! Directories and symlinks are created synchronously on the walker's path,
//! so a directory always exists before its children. Regular-file operations
//! are dispatched to a bounded worker pool; their completion order is not
//! observable. The pool surfaces the first error: in-flight operations may
//! finish but no new ones start, and the materialization is reported failed.

use crate::error::Error;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// Default worker count for file operations.
pub const DEFAULT_FS_CONCURRENCY: usize = 16;

/// Upper bound on the worker pool size.
pub const MAX_FS_CONCURRENCY: usize = 128;

/// How regular files are reproduced at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkStrategy {
    /// `link(2)` every file; any failure is fatal. Requires one filesystem.
    Hardlink,
    /// Full byte copies.
    Copy,
    /// Try `link(2)`, fall back to a copy per-file when the filesystem
    /// refuses links (`EXDEV`, `EPERM`, `ENOTSUP`, `EACCES`).
    #[default]
    Auto,
}

impl LinkStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hardlink => "hardlink",
            Self::Copy => "copy",
            Self::Auto => "auto",
        }
    }

    /// Parse a strategy name. Unknown names fall back to `auto`.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "hardlink" => Self::Hardlink,
            "copy" => Self::Copy,
            _ => Self::Auto,
        }
    }
}

/// Counters for one materialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeStats {
    pub files: u64,
    pub files_linked: u64,
    pub files_copied: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub link_fallback_copies: u64,
}

/// Cooperative cancellation signal shared with the worker pool.
///
/// Once raised, workers finish the file operation in hand and stop; the
/// materialization returns [`Error::Cancelled`] and the caller removes its
/// staging directory.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of a completed materialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeOutcome {
    pub stats: MaterializeStats,
    pub duration_ms: u64,
    pub strategy: LinkStrategy,
}

/// Clamp a requested worker count into the supported range.
#[must_use]
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_FS_CONCURRENCY)
}

#[derive(Debug)]
struct FileJob {
    src: PathBuf,
    dst: PathBuf,
}

#[derive(Default)]
struct FileCounters {
    files: AtomicU64,
    linked: AtomicU64,
    copied: AtomicU64,
    fallback_copies: AtomicU64,
}

/// Reproduce `src` at `dst` with the given strategy.
///
/// `dst` is created; the caller guarantees it is empty. Directory creation
/// happens in walk order (parents before children), then file operations run
/// on a pool of `concurrency` workers (clamped to 1..=128).
///
/// # Errors
/// Fails on the first file operation error (per strategy rules), on walk
/// errors, or with [`Error::Cancelled`] when the token is raised. The caller
/// owns cleanup of the partially-written destination.
pub fn materialize_tree(
    src: &Path,
    dst: &Path,
    strategy: LinkStrategy,
    concurrency: usize,
    cancel: &CancelToken,
) -> Result<MaterializeOutcome, Error> {
    let started = Instant::now();

    if !src.is_dir() {
        return Err(Error::path_io(
            "materialize",
            src.to_path_buf(),
            io::Error::new(io::ErrorKind::NotFound, "source directory missing"),
        ));
    }

    let mut directories = 0u64;
    let mut symlinks = 0u64;
    let mut jobs: Vec<FileJob> = Vec::new();

    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map_or_else(|| src.to_path_buf(), Path::to_path_buf);
            let io_err = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("walk failed"));
            Error::path_io("walk", path, io_err)
        })?;

        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walk entries stay under the source root");
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| Error::path_io("create_dir", target.clone(), e))?;
            directories += 1;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())
                .map_err(|e| Error::path_io("read_link", entry.path().to_path_buf(), e))?;
            recreate_symlink(&link_target, entry.path(), &target)?;
            symlinks += 1;
        } else {
            jobs.push(FileJob {
                src: entry.path().to_path_buf(),
                dst: target,
            });
        }
    }

    let counters = FileCounters::default();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(clamp_concurrency(concurrency))
        .build()
        .map_err(|e| Error::Io(io::Error::other(e)))?;

    pool.install(|| {
        jobs.par_iter().try_for_each(|job| {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            place_file(job, strategy, &counters)
        })
    })?;

    let stats = MaterializeStats {
        files: counters.files.load(Ordering::Relaxed),
        files_linked: counters.linked.load(Ordering::Relaxed),
        files_copied: counters.copied.load(Ordering::Relaxed),
        directories,
        symlinks,
        link_fallback_copies: counters.fallback_copies.load(Ordering::Relaxed),
    };

    Ok(MaterializeOutcome {
        stats,
        duration_ms: started.elapsed().as_millis() as u64,
        strategy,
    })
}

fn place_file(job: &FileJob, strategy: LinkStrategy, counters: &FileCounters) -> Result<(), Error> {
    match strategy {
        LinkStrategy::Hardlink => {
            fs::hard_link(&job.src, &job.dst)
                .map_err(|e| Error::path_io("link", job.dst.clone(), e))?;
            counters.linked.fetch_add(1, Ordering::Relaxed);
        }
        LinkStrategy::Copy => {
            fs::copy(&job.src, &job.dst).map_err(|e| Error::path_io("copy", job.dst.clone(), e))?;
            counters.copied.fetch_add(1, Ordering::Relaxed);
        }
        LinkStrategy::Auto => match fs::hard_link(&job.src, &job.dst) {
            Ok(()) => {
                counters.linked.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if link_refused(&e) => {
                fs::copy(&job.src, &job.dst)
                    .map_err(|e| Error::path_io("copy", job.dst.clone(), e))?;
                counters.copied.fetch_add(1, Ordering::Relaxed);
                counters.fallback_copies.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                return Err(Error::path_io("link", job.dst.clone(), e));
            }
        },
    }
    counters.files.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

/// Whether a `link(2)` failure means "this filesystem refuses links" (fall
/// back to copy) rather than a real error.
fn link_refused(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        if let Some(code) = err.raw_os_error() {
            return matches!(
                code,
                libc::EXDEV | libc::EPERM | libc::EACCES | libc::EOPNOTSUPP
            );
        }
    }

    #[cfg(windows)]
    {
        // ERROR_NOT_SAME_DEVICE
        if err.raw_os_error() == Some(17) {
            return true;
        }
    }

    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::Unsupported
    )
}

#[cfg(unix)]
fn recreate_symlink(link_target: &Path, _src: &Path, dst: &Path) -> Result<(), Error> {
    std::os::unix::fs::symlink(link_target, dst)
        .map_err(|e| Error::path_io("symlink", dst.to_path_buf(), e))
}

#[cfg(windows)]
fn recreate_symlink(link_target: &Path, src: &Path, dst: &Path) -> Result<(), Error> {
    // Resolve relative targets against the link's own directory to decide
    // between a file symlink and a directory junction.
    let resolved = if link_target.is_absolute() {
        link_target.to_path_buf()
    } else {
        src.parent()
            .unwrap_or_else(|| Path::new("."))
            .join(link_target)
    };

    if resolved.is_dir() {
        junction::create(&resolved, dst).map_err(|e| Error::path_io("junction", dst.to_path_buf(), e))
    } else {
        std::os::windows::fs::symlink_file(link_target, dst)
            .map_err(|e| Error::path_io("symlink", dst.to_path_buf(), e))
    }
}
