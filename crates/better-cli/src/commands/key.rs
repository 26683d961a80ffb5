//! `better key` — derive and print the project's cache key.

use super::{print_json, report_ineligible};
use better_core::{derive_key, lock_report, CacheOptions, Host, KeyDerivation};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyOutput<'a> {
    eligible: bool,
    key: &'a str,
    lock_hash: &'a str,
    lockfile: &'a better_core::LockfileRef,
    fingerprint: &'a better_core::Fingerprint,
}

pub fn run(
    project_root: &Path,
    opts: &CacheOptions,
    host: &Host,
    with_lock_report: bool,
    json: bool,
) -> Result<()> {
    let derivation = derive_key(project_root, host, opts).into_diagnostic()?;

    let derived = match derivation {
        KeyDerivation::Eligible(derived) => derived,
        KeyDerivation::Ineligible(reason) => {
            // A decision, not a failure: exit 0 either way.
            return report_ineligible(reason, json);
        }
    };

    if with_lock_report {
        // The document is the output, with or without --json.
        return print_json(&lock_report(project_root, &derived, opts));
    }

    if json {
        print_json(&KeyOutput {
            eligible: true,
            key: &derived.key,
            lock_hash: &derived.lock_hash,
            lockfile: &derived.lockfile,
            fingerprint: &derived.fingerprint,
        })
    } else {
        println!("key:      {}", derived.key);
        println!("lockfile: {} ({})", derived.lockfile.file, derived.lock_hash);
        println!(
            "mode:     {} / {} on {}-{}",
            opts.cache_mode.as_str(),
            opts.scripts_mode.as_str(),
            derived.fingerprint.platform,
            derived.fingerprint.arch
        );
        Ok(())
    }
}
