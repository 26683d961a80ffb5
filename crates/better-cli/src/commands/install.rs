//! `better install` — the full cached install flow.
//!
//! The real package-manager processes are spawned here, at the outermost
//! layer; the core only ever sees them through the delegate trait.

use super::print_json;
use better_core::{
    run_install, CacheLayout, CacheOptions, CancelToken, Host, InstallDelegate, InstallPath,
};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Delegate that shells out to the configured package manager.
struct PmDelegate {
    pm: &'static str,
    project_root: PathBuf,
    frozen: bool,
}

impl PmDelegate {
    fn spawn(&self, args: &[&str]) -> Result<(), String> {
        debug!(pm = self.pm, ?args, "spawning package manager");
        let status = Command::new(self.pm)
            .args(args)
            .current_dir(&self.project_root)
            .status()
            .map_err(|e| format!("failed to spawn {}: {e}", self.pm))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("{} {} exited with {status}", self.pm, args.join(" ")))
        }
    }
}

impl InstallDelegate for PmDelegate {
    fn install(&mut self) -> Result<(), String> {
        let args: &[&str] = match (self.pm, self.frozen) {
            ("npm", true) => &["ci"],
            (_, true) => &["install", "--frozen-lockfile"],
            (_, false) => &["install"],
        };
        self.spawn(args)
    }

    fn rebuild(&mut self) -> Result<(), String> {
        self.spawn(&["rebuild"])
    }
}

pub fn run(
    layout: &CacheLayout,
    project_root: &Path,
    opts: &CacheOptions,
    host: &Host,
    json: bool,
) -> Result<()> {
    let mut delegate = PmDelegate {
        pm: opts.pm.as_str(),
        project_root: project_root.to_path_buf(),
        frozen: opts.frozen,
    };

    let report = run_install(
        layout,
        project_root,
        host,
        opts,
        &mut delegate,
        &CancelToken::new(),
    )
    .into_diagnostic()?;

    if report.cache_root_fell_back {
        info!(
            root = %layout.root().display(),
            "cache root was not writable; using per-project cache"
        );
    }

    if json {
        print_json(&report)?;
    } else {
        match report.path {
            InstallPath::NoOp => println!("up to date (reuse marker matched)"),
            InstallPath::Restored => {
                let stats = report
                    .restore
                    .as_ref()
                    .map_or_else(Default::default, |r| r.stats.clone());
                println!(
                    "restored from cache: {} files ({} linked) in {}ms",
                    stats.files,
                    stats.files_linked,
                    report.duration_ms
                );
            }
            InstallPath::InstalledCaptured => {
                println!("installed and captured to cache in {}ms", report.duration_ms);
            }
            InstallPath::InstalledOnly => {
                println!("installed (cache not written) in {}ms", report.duration_ms);
            }
            InstallPath::ExternalOnly => {
                println!("installed without cache participation");
            }
        }
        for warning in &report.warnings {
            eprintln!("warning: {warning}");
        }
    }

    Ok(())
}
