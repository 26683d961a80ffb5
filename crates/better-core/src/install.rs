//! End-to-end install orchestration.
//!
//! One invocation walks the state machine:
//! derive key → reuse check → (no-op | restore | external install + capture),
//! with the state index updated as the final write in every path. The actual
//! package-manager spawn stays behind [`InstallDelegate`]; the core never
//! executes processes.
//!
//! The cache is an enhancement: when a cache step fails after the project
//! has a good tree (capture error, index write error), the install still
//! reports success and the problem is attached as a warning.

use crate::capture::{capture, CaptureReport};
use crate::config::{CacheOptions, ScriptsMode};
use crate::error::{Failure, Reason};
use crate::fingerprint::Host;
use crate::key::{derive_key, EligibleKey, KeyDerivation};
use crate::layout::CacheLayout;
use crate::marker::{
    evaluate_marker, touch_marker, write_marker, MarkerExpectation, ReuseMarker, MARKER_ENGINE,
    MARKER_VERSION,
};
use crate::materialize::CancelToken;
use crate::restore::{restore, RestoreReport};
use crate::scan::scan_tree;
use crate::stamp::{new_run_id, now_iso};
use crate::state;
use crate::store::verify_entry;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

/// The external work the orchestrator delegates.
pub trait InstallDelegate {
    /// Run the real package-manager install in the project.
    ///
    /// # Errors
    /// Returns a human-readable message when the install fails.
    fn install(&mut self) -> Result<(), String>;

    /// Re-run native-module rebuilds after a restore, when
    /// `scriptsMode == rebuild`.
    ///
    /// # Errors
    /// Returns a human-readable message when the rebuild fails.
    fn rebuild(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// Which way the state machine went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPath {
    /// Reuse marker matched; nothing was done.
    NoOp,
    /// A verified entry was materialized into the project.
    Restored,
    /// External install ran and the result was captured.
    InstalledCaptured,
    /// External install ran; capture was skipped or failed.
    InstalledOnly,
    /// Project is ineligible for caching; only the external install ran.
    ExternalOnly,
}

/// Orchestration failure: either the external install failed, or a cache
/// step failed before the project had a usable tree.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("external install failed: {0}")]
    External(String),
    #[error(transparent)]
    Cache(#[from] Failure),
}

/// What one install invocation did.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallReport {
    pub path: InstallPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ineligible_reason: Option<Reason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore: Option<RestoreReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_skipped: Option<Reason>,
    pub warnings: Vec<String>,
    pub cache_root_fell_back: bool,
    pub duration_ms: u64,
}

impl InstallReport {
    fn new(path: InstallPath, layout: &CacheLayout, started: Instant) -> Self {
        Self {
            path,
            key: None,
            ineligible_reason: None,
            restore: None,
            capture: None,
            capture_skipped: None,
            warnings: Vec::new(),
            cache_root_fell_back: layout.fell_back(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Run one install through the cache.
///
/// # Errors
/// Fails when the delegated install (or post-restore rebuild) fails, or when
/// a cache data-plane step fails while the project still has no usable tree.
pub fn run_install(
    layout: &CacheLayout,
    project_root: &Path,
    host: &Host,
    opts: &CacheOptions,
    delegate: &mut dyn InstallDelegate,
    cancel: &CancelToken,
) -> Result<InstallReport, InstallError> {
    let started = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if let Err(e) = layout.ensure_scaffold() {
        return Err(InstallError::Cache(Failure::new(
            Reason::PermissionDenied,
            format!("cache scaffold at {}: {e}", layout.root().display()),
        )));
    }

    // DeriveKey. A derivation I/O error is treated like ineligibility: the
    // install must not break because the cache cannot read a lockfile.
    let derivation = match derive_key(project_root, host, opts) {
        Ok(derivation) => derivation,
        Err(e) => {
            warnings.push(format!("key derivation failed: {e}"));
            KeyDerivation::Ineligible(Reason::ReuseContextUnavailable)
        }
    };

    let derived = match derivation {
        KeyDerivation::Eligible(derived) => *derived,
        KeyDerivation::Ineligible(reason) => {
            delegate.install().map_err(InstallError::External)?;

            let mut report = InstallReport::new(InstallPath::ExternalOnly, layout, started);
            report.ineligible_reason = Some(reason);
            report.warnings = warnings;
            update_index(layout, &mut report, |index| {
                index.record_external_run();
                index.record_project(project_root, opts.pm);
            });
            return Ok(report);
        }
    };

    // ReuseCheck.
    let expectation = MarkerExpectation {
        global_key: derived.key.clone(),
        lock_hash: derived.lock_hash.clone(),
        runtime_fingerprint: derived.fingerprint.clone(),
    };
    if evaluate_marker(project_root, Some(&expectation)).hit {
        if let Err(e) = touch_marker(project_root) {
            warnings.push(format!("marker touch failed: {e}"));
        }

        let mut report = InstallReport::new(InstallPath::NoOp, layout, started);
        report.key = Some(derived.key.clone());
        report.warnings = warnings;
        update_index(layout, &mut report, |index| {
            index.record_hit(&derived.key, project_root, false);
            index.record_project(project_root, opts.pm);
        });
        return Ok(report);
    }

    // VerifyEntry → Restore.
    if verify_entry(layout, &derived.key).ok {
        match restore(
            layout,
            &derived.key,
            project_root,
            opts.link_strategy,
            opts.fs_concurrency,
            cancel,
        ) {
            Ok(restored) => {
                if opts.scripts_mode == ScriptsMode::Rebuild {
                    delegate.rebuild().map_err(InstallError::External)?;
                }
                write_marker_or_warn(project_root, &derived, opts, &mut warnings);

                let mut report = InstallReport::new(InstallPath::Restored, layout, started);
                report.key = Some(derived.key.clone());
                report.restore = Some(restored);
                report.warnings = warnings;
                update_index(layout, &mut report, |index| {
                    index.record_hit(&derived.key, project_root, true);
                    index.record_project(project_root, opts.pm);
                });
                return Ok(report);
            }
            Err(failure) => {
                // Likely a GC race; fall back to the external install.
                warnings.push(format!("restore failed, falling back: {failure}"));
            }
        }
    }

    // Miss: the external install produces the tree.
    delegate.install().map_err(InstallError::External)?;

    let mut report = InstallReport::new(InstallPath::InstalledOnly, layout, started);
    report.key = Some(derived.key.clone());

    if opts.cache_read_only {
        report.capture_skipped = Some(Reason::CacheReadOnly);
    } else {
        match capture(layout, &derived, project_root, opts, cancel) {
            Ok(captured) => {
                report.path = InstallPath::InstalledCaptured;
                report.capture = Some(captured);
            }
            Err(failure) => {
                warnings.push(format!("capture failed: {failure}"));
            }
        }
    }

    write_marker_or_warn(project_root, &derived, opts, &mut warnings);

    let entry_size = scan_tree(&layout.entry_paths(&derived.key).root)
        .map(|totals| totals.physical_bytes)
        .unwrap_or(0);

    report.warnings = warnings;
    let captured = report.path == InstallPath::InstalledCaptured;
    update_index(layout, &mut report, |index| {
        index.record_miss(&derived.key);
        if captured {
            index.record_entry_stored(&derived, project_root, opts, entry_size);
        }
        index.record_project(project_root, opts.pm);
    });
    Ok(report)
}

fn write_marker_or_warn(
    project_root: &Path,
    derived: &EligibleKey,
    opts: &CacheOptions,
    warnings: &mut Vec<String>,
) {
    let marker = ReuseMarker {
        version: MARKER_VERSION,
        engine: MARKER_ENGINE.to_string(),
        global_key: derived.key.clone(),
        lock_hash: derived.lock_hash.clone(),
        runtime_fingerprint: derived.fingerprint.clone(),
        scripts_mode: opts.scripts_mode,
        link_strategy: opts.link_strategy,
        updated_at: now_iso(),
        run_id: new_run_id(),
    };
    if let Err(e) = write_marker(project_root, &marker) {
        warnings.push(format!("marker write failed: {e}"));
    }
}

/// Read-modify-write the state index as the final step of an invocation.
/// Index failures never fail the install; they become a
/// `state_write_failed` warning.
fn update_index(
    layout: &CacheLayout,
    report: &mut InstallReport,
    mutate: impl FnOnce(&mut state::StateIndex),
) {
    let path = layout.state_file();
    let mut index = state::load(&path);
    mutate(&mut index);
    if let Err(e) = state::save(&path, &index) {
        report
            .warnings
            .push(format!("{}: {e}", Reason::StateWriteFailed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct ScriptedDelegate {
        installs: u32,
        rebuilds: u32,
        fail_install: bool,
        packages: Vec<(&'static str, &'static str)>,
        project_root: std::path::PathBuf,
    }

    impl ScriptedDelegate {
        fn for_project(root: &Path) -> Self {
            Self {
                packages: vec![("left-pad", "module.exports = 1;\n")],
                project_root: root.to_path_buf(),
                ..Self::default()
            }
        }
    }

    impl InstallDelegate for ScriptedDelegate {
        fn install(&mut self) -> Result<(), String> {
            self.installs += 1;
            if self.fail_install {
                return Err(String::from("registry unreachable"));
            }
            for (name, contents) in &self.packages {
                let dir = self.project_root.join("node_modules").join(name);
                fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
                fs::write(dir.join("index.js"), contents).map_err(|e| e.to_string())?;
            }
            Ok(())
        }

        fn rebuild(&mut self) -> Result<(), String> {
            self.rebuilds += 1;
            Ok(())
        }
    }

    fn host() -> Host {
        Host {
            platform: String::from("linux"),
            arch: String::from("x64"),
            node_major: Some(20),
            libc: String::from("glibc-2.35"),
        }
    }

    #[test]
    fn test_no_lockfile_is_external_only() {
        let cache = tempdir().unwrap();
        let project = tempdir().unwrap();
        let layout = CacheLayout::at_root(cache.path());
        let mut delegate = ScriptedDelegate::for_project(project.path());

        let report = run_install(
            &layout,
            project.path(),
            &host(),
            &CacheOptions::default(),
            &mut delegate,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(report.path, InstallPath::ExternalOnly);
        assert_eq!(report.ineligible_reason, Some(Reason::LockfileNotFound));
        assert_eq!(delegate.installs, 1);
    }

    #[test]
    fn test_cold_miss_then_warm_hit_then_no_op() {
        let cache = tempdir().unwrap();
        let layout = CacheLayout::at_root(cache.path());
        let opts = CacheOptions::default();

        // Run 1: cold miss. External install runs, entry is captured.
        let p1 = tempdir().unwrap();
        fs::write(p1.path().join("package-lock.json"), b"{\"v\":1}").unwrap();
        let mut d1 = ScriptedDelegate::for_project(p1.path());
        let r1 = run_install(&layout, p1.path(), &host(), &opts, &mut d1, &CancelToken::new())
            .unwrap();
        assert_eq!(r1.path, InstallPath::InstalledCaptured);
        assert_eq!(d1.installs, 1);
        let key = r1.key.clone().unwrap();

        // Run 2: fresh project, same lockfile. Restored from cache, no
        // external install, rebuild runs.
        let p2 = tempdir().unwrap();
        fs::write(p2.path().join("package-lock.json"), b"{\"v\":1}").unwrap();
        let mut d2 = ScriptedDelegate::for_project(p2.path());
        let r2 = run_install(&layout, p2.path(), &host(), &opts, &mut d2, &CancelToken::new())
            .unwrap();
        assert_eq!(r2.path, InstallPath::Restored);
        assert_eq!(r2.key.as_deref(), Some(key.as_str()));
        assert_eq!(d2.installs, 0);
        assert_eq!(d2.rebuilds, 1);
        assert!(p2
            .path()
            .join("node_modules")
            .join("left-pad")
            .join("index.js")
            .is_file());

        // Run 3: same project again. Marker matches, pure no-op.
        let mut d3 = ScriptedDelegate::for_project(p2.path());
        let r3 = run_install(&layout, p2.path(), &host(), &opts, &mut d3, &CancelToken::new())
            .unwrap();
        assert_eq!(r3.path, InstallPath::NoOp);
        assert_eq!(d3.installs, 0);
        assert_eq!(d3.rebuilds, 0);

        // Metrics saw one miss and two hits.
        let index = state::load(&layout.state_file());
        assert_eq!(index.cache_metrics.install_runs, 3);
        assert_eq!(index.cache_metrics.cache_hits, 2);
        assert_eq!(index.cache_metrics.cache_misses, 1);
    }

    #[test]
    fn test_lockfile_change_invalidates() {
        let cache = tempdir().unwrap();
        let layout = CacheLayout::at_root(cache.path());
        let opts = CacheOptions::default();

        let project = tempdir().unwrap();
        fs::write(project.path().join("package-lock.json"), b"{\"v\":1}").unwrap();
        let mut d1 = ScriptedDelegate::for_project(project.path());
        let r1 = run_install(
            &layout,
            project.path(),
            &host(),
            &opts,
            &mut d1,
            &CancelToken::new(),
        )
        .unwrap();

        // One byte changes; the marker no longer authorizes a no-op and a
        // different key misses.
        fs::write(project.path().join("package-lock.json"), b"{\"v\":2}").unwrap();
        let mut d2 = ScriptedDelegate::for_project(project.path());
        let r2 = run_install(
            &layout,
            project.path(),
            &host(),
            &opts,
            &mut d2,
            &CancelToken::new(),
        )
        .unwrap();

        assert_ne!(r1.key, r2.key);
        assert_eq!(r2.path, InstallPath::InstalledCaptured);
        assert_eq!(d2.installs, 1);
    }

    #[test]
    fn test_cache_read_only_skips_capture() {
        let cache = tempdir().unwrap();
        let layout = CacheLayout::at_root(cache.path());
        let opts = CacheOptions {
            cache_read_only: true,
            ..CacheOptions::default()
        };

        let project = tempdir().unwrap();
        fs::write(project.path().join("package-lock.json"), b"{\"v\":1}").unwrap();
        let mut delegate = ScriptedDelegate::for_project(project.path());
        let report = run_install(
            &layout,
            project.path(),
            &host(),
            &opts,
            &mut delegate,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(report.path, InstallPath::InstalledOnly);
        assert_eq!(report.capture_skipped, Some(Reason::CacheReadOnly));
        // Marker still written: the next run can no-op.
        assert!(crate::marker::marker_path(project.path()).is_file());
        // But no entry was published.
        assert!(!verify_entry(&layout, report.key.as_deref().unwrap()).ok);
    }

    #[test]
    fn test_external_failure_propagates() {
        let cache = tempdir().unwrap();
        let layout = CacheLayout::at_root(cache.path());

        let project = tempdir().unwrap();
        fs::write(project.path().join("package-lock.json"), b"{\"v\":1}").unwrap();
        let mut delegate = ScriptedDelegate::for_project(project.path());
        delegate.fail_install = true;

        let err = run_install(
            &layout,
            project.path(),
            &host(),
            &CacheOptions::default(),
            &mut delegate,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, InstallError::External(_)));
        // Nothing was published for the failed install.
        assert!(!crate::marker::marker_path(project.path()).is_file());
    }

    #[test]
    fn test_corrupt_state_index_does_not_break_install() {
        let cache = tempdir().unwrap();
        let layout = CacheLayout::at_root(cache.path());
        fs::create_dir_all(cache.path()).unwrap();
        fs::write(layout.state_file(), b"*** not json ***").unwrap();

        let project = tempdir().unwrap();
        fs::write(project.path().join("package-lock.json"), b"{\"v\":1}").unwrap();
        let mut delegate = ScriptedDelegate::for_project(project.path());
        let report = run_install(
            &layout,
            project.path(),
            &host(),
            &CacheOptions::default(),
            &mut delegate,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(report.path, InstallPath::InstalledCaptured);
        // The index was rebuilt from the default skeleton.
        let index = state::load(&layout.state_file());
        assert_eq!(index.cache_metrics.install_runs, 1);
    }
}
