//! `better restore` — materialize a cache entry into the project.

use super::{derive_eligible_key, print_json};
use better_core::{is_valid_key, restore, state, CacheLayout, CacheOptions, CancelToken, Host};
use miette::Result;
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
    key: Option<&str>,
    opts: &CacheOptions,
    host: &Host,
    json: bool,
) -> Result<()> {
    let key = match key {
        Some(key) => {
            if !is_valid_key(key) {
                eprintln!("error: '{key}' is not a 64-hex cache key");
                std::process::exit(2);
            }
            key.to_string()
        }
        None => match derive_eligible_key(project_root, opts, host, json)? {
            Some(derived) => derived.key,
            None => return Ok(()),
        },
    };

    debug!(%key, strategy = opts.link_strategy.as_str(), "restoring entry");

    match restore(
        layout,
        &key,
        project_root,
        opts.link_strategy,
        opts.fs_concurrency,
        &CancelToken::new(),
    ) {
        Ok(report) => {
            record_hit(layout, &key, project_root);
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "restored {} files ({} linked, {} copied) in {}ms",
                    report.stats.files,
                    report.stats.files_linked,
                    report.stats.files_copied,
                    report.duration_ms
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
                eprintln!("restore failed: {failure}");
            }
            std::process::exit(1);
        }
    }
}

fn record_hit(layout: &CacheLayout, key: &str, project_root: &Path) {
    let path = layout.state_file();
    let mut index = state::load(&path);
    index.record_hit(key, project_root, true);
    if let Err(e) = state::save(&path, &index) {
        warn!("state index update failed: {e}");
    }
}
