//! `better verify` — check that a cache entry is complete.

use super::print_json;
use better_core::{is_valid_key, verify_entry, CacheLayout};
use miette::Result;

pub fn run(layout: &CacheLayout, key: &str, json: bool) -> Result<()> {
    if !is_valid_key(key) {
        eprintln!("error: '{key}' is not a 64-hex cache key");
        std::process::exit(2);
    }

    let outcome = verify_entry(layout, key);

    if json {
        print_json(&outcome)?;
    } else if outcome.ok {
        println!("ok: entry {key} is complete");
    } else {
        println!(
            "invalid: {}",
            outcome.reason.map_or("unknown", |r| r.as_str())
        );
    }

    if !outcome.ok {
        std::process::exit(1);
    }
    Ok(())
}
