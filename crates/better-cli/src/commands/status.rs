//! `better status` — cache totals and hit/miss metrics.

use super::print_json;
use better_core::{scan_tree, state, CacheLayout};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOutput {
    cache_root: String,
    logical_bytes: u64,
    physical_bytes: u64,
    file_count: u64,
    tracked_entries: usize,
    tracked_projects: usize,
    install_runs: u64,
    cache_hits: u64,
    cache_misses: u64,
}

pub fn run(layout: &CacheLayout, json: bool) -> Result<()> {
    let totals = scan_tree(&layout.materializations_dir()).into_diagnostic()?;
    let index = state::load(&layout.state_file());

    let output = StatusOutput {
        cache_root: layout.root().display().to_string(),
        logical_bytes: totals.logical_bytes,
        physical_bytes: totals.physical_bytes,
        file_count: totals.file_count,
        tracked_entries: index.cache_entries.len(),
        tracked_projects: index.projects.len(),
        install_runs: index.cache_metrics.install_runs,
        cache_hits: index.cache_metrics.cache_hits,
        cache_misses: index.cache_metrics.cache_misses,
    };

    if json {
        print_json(&output)
    } else {
        println!("cache root:   {}", output.cache_root);
        println!(
            "store size:   {} physical bytes ({} logical) across {} files",
            output.physical_bytes, output.logical_bytes, output.file_count
        );
        println!(
            "tracked:      {} entries, {} projects",
            output.tracked_entries, output.tracked_projects
        );
        println!(
            "installs:     {} runs ({} hits, {} misses)",
            output.install_runs, output.cache_hits, output.cache_misses
        );
        Ok(())
    }
}
