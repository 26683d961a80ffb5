pub mod capture;
pub mod gc;
pub mod install;
pub mod key;
pub mod marker;
pub mod restore;
pub mod status;
pub mod verify;

use better_core::{derive_key, CacheOptions, EligibleKey, Host, KeyDerivation, Reason};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::Path;

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{text}");
    Ok(())
}

/// Derive the key for a project, reporting ineligibility as a decision.
///
/// Returns `None` after printing the decision when the project cannot
/// participate in the cache (e.g. no lockfile). Ineligibility is not a
/// failure: callers have nothing more to do and exit 0.
pub(crate) fn derive_eligible_key(
    project_root: &Path,
    opts: &CacheOptions,
    host: &Host,
    json: bool,
) -> Result<Option<EligibleKey>> {
    let derivation = derive_key(project_root, host, opts).into_diagnostic()?;
    match derivation {
        KeyDerivation::Eligible(derived) => Ok(Some(*derived)),
        KeyDerivation::Ineligible(reason) => {
            report_ineligible(reason, json)?;
            Ok(None)
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IneligibleOutput {
    eligible: bool,
    reason: Reason,
}

pub(crate) fn report_ineligible(reason: Reason, json: bool) -> Result<()> {
    if json {
        print_json(&IneligibleOutput {
            eligible: false,
            reason,
        })?;
    } else {
        eprintln!("not eligible for caching: {reason}");
    }
    Ok(())
}
