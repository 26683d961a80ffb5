//! `better gc` — evict old or excess cache entries.
//!
//! Flags override the policy persisted in the state index; with neither
//! flags nor a persisted policy there is nothing to do.

use super::print_json;
use better_core::{run_gc, state, CacheLayout, GcPolicy};
use miette::{IntoDiagnostic, Result};
use tracing::warn;

pub fn run(
    layout: &CacheLayout,
    max_age_days: Option<u32>,
    max_size_bytes: Option<u64>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let state_path = layout.state_file();
    let mut index = state::load(&state_path);

    let policy = GcPolicy {
        max_age_days: max_age_days.or(index.gc.max_age_days),
        max_size_bytes: max_size_bytes.or(index.gc.max_size_bytes),
        lru_window_days: index.gc.lru_window_days,
    };

    if policy.max_age_days.is_none() && policy.max_size_bytes.is_none() {
        eprintln!("error: no GC policy; pass --max-age-days and/or --max-size-bytes");
        std::process::exit(2);
    }

    let report = run_gc(layout, &policy, dry_run).into_diagnostic()?;

    if !dry_run && !report.deletions.is_empty() {
        for deletion in &report.deletions {
            index.record_evicted(&deletion.key);
        }
        if let Err(e) = state::save(&state_path, &index) {
            warn!("state index update failed: {e}");
        }
    }

    if json {
        print_json(&report)?;
    } else {
        let verb = if dry_run { "would remove" } else { "removed" };
        println!(
            "{verb} {} entries, freeing {} bytes",
            report.entries_removed, report.bytes_freed
        );
        for deletion in &report.deletions {
            println!("  {}  {} bytes", deletion.key, deletion.bytes);
        }
    }
    Ok(())
}
