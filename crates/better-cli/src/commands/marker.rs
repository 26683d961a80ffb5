//! `better marker` — evaluate the project's reuse marker.

use super::print_json;
use better_core::marker::MarkerExpectation;
use better_core::{derive_key, evaluate_marker, CacheOptions, Host, KeyDerivation};
use miette::{IntoDiagnostic, Result};
use std::path::Path;

pub fn run(project_root: &Path, opts: &CacheOptions, host: &Host, json: bool) -> Result<()> {
    let derivation = derive_key(project_root, host, opts).into_diagnostic()?;
    let expectation = derivation.eligible().map(|derived| MarkerExpectation {
        global_key: derived.key.clone(),
        lock_hash: derived.lock_hash.clone(),
        runtime_fingerprint: derived.fingerprint.clone(),
    });

    // With no derivable context the verdict is reuse_context_unavailable.
    let verdict = evaluate_marker(project_root, expectation.as_ref());

    if json {
        print_json(&verdict)?;
    } else if verdict.hit {
        println!("hit: the installed tree matches the derived key");
    } else {
        println!(
            "miss: {}",
            verdict.reason.map_or("unknown", |r| r.as_str())
        );
    }

    if !verdict.hit {
        std::process::exit(1);
    }
    Ok(())
}
