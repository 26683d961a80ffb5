//! `better capture` — publish the project's node_modules as a cache entry.

use super::{derive_eligible_key, print_json};
use better_core::{capture, scan_tree, state, CacheLayout, CacheOptions, CancelToken, Host};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureOutput<'a> {
    ok: bool,
    reason: better_core::Reason,
    message: &'a str,
}

pub fn run(
    layout: &CacheLayout,
    project_root: &Path,
    opts: &CacheOptions,
    host: &Host,
    json: bool,
) -> Result<()> {
    layout.ensure_scaffold().into_diagnostic()?;
    let Some(derived) = derive_eligible_key(project_root, opts, host, json)? else {
        return Ok(());
    };

    debug!(key = %derived.key, "capturing node_modules");

    match capture(layout, &derived, project_root, opts, &CancelToken::new()) {
        Ok(report) => {
            let size = scan_tree(&layout.entry_paths(&derived.key).root)
                .map(|totals| totals.physical_bytes)
                .unwrap_or(0);

            let path = layout.state_file();
            let mut index = state::load(&path);
            index.record_entry_stored(&derived, project_root, opts, size);
            index.record_project(project_root, opts.pm);
            if let Err(e) = state::save(&path, &index) {
                warn!("state index update failed: {e}");
            }

            if json {
                print_json(&report)?;
            } else {
                println!(
                    "captured {} files as {} in {}ms",
                    report.stats.files, derived.key, report.duration_ms
                );
            }
            Ok(())
        }
        Err(failure) => {
            if json {
                print_json(&FailureOutput {
                    ok: false,
                    reason: failure.reason,
                    message: &failure.message,
                })?;
            } else {
                eprintln!("capture failed: {failure}");
            }
            std::process::exit(1);
        }
    }
}
