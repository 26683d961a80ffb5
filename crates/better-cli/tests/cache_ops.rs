//! Integration tests for capture/verify/restore/status through the binary.
//!
//! Each test points `BETTER_CACHE_ROOT` at its own temp directory, so tests
//! never touch the real user cache and can run in parallel.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn better(cache_root: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "better-cli", "--bin", "better", "--"]);
    cmd.env("BETTER_CACHE_ROOT", cache_root);
    cmd
}

fn seed_project(dir: &Path) {
    fs::create_dir_all(dir.join("node_modules").join("tiny")).unwrap();
    fs::write(
        dir.join("node_modules").join("tiny").join("index.js"),
        b"module.exports = 42;\n",
    )
    .unwrap();
    fs::write(dir.join("package-lock.json"), b"{\"lockfileVersion\":3}").unwrap();
}

#[test]
fn test_capture_then_verify_then_restore() {
    let cache = tempdir().unwrap();
    let source = tempdir().unwrap();
    seed_project(source.path());

    // Capture.
    let output = better(cache.path())
        .args(["--json", "capture", "--node-major", "20", "--cwd"])
        .arg(source.path())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "capture stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // Ask for the key the same way the capture derived it.
    let key_out = better(cache.path())
        .args(["--json", "key", "--node-major", "20", "--cwd"])
        .arg(source.path())
        .output()
        .unwrap();
    let key_json: serde_json::Value = serde_json::from_slice(&key_out.stdout).unwrap();
    let key = key_json["key"].as_str().unwrap().to_string();

    // Verify.
    let verify_out = better(cache.path())
        .args(["--json", "verify", &key])
        .output()
        .unwrap();
    assert!(verify_out.status.success());
    let verify_json: serde_json::Value = serde_json::from_slice(&verify_out.stdout).unwrap();
    assert_eq!(verify_json["ok"], true);
    assert_eq!(verify_json["meta"]["key"], key.as_str());

    // Restore into a fresh project.
    let target = tempdir().unwrap();
    fs::write(target.path().join("package-lock.json"), b"{\"lockfileVersion\":3}").unwrap();
    let restore_out = better(cache.path())
        .args(["--json", "restore", &key, "--node-major", "20", "--cwd"])
        .arg(target.path())
        .output()
        .unwrap();
    assert!(
        restore_out.status.success(),
        "restore stderr: {}",
        String::from_utf8_lossy(&restore_out.stderr)
    );
    assert!(target
        .path()
        .join("node_modules")
        .join("tiny")
        .join("index.js")
        .is_file());
}

#[test]
fn test_verify_missing_entry_fails_with_reason() {
    let cache = tempdir().unwrap();
    let key = "ab".repeat(32);

    let output = better(cache.path())
        .args(["--json", "verify", &key])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["ok"], false);
    assert_eq!(json["reason"], "entry_node_modules_missing");
}

#[test]
fn test_verify_rejects_malformed_key() {
    let cache = tempdir().unwrap();

    let output = better(cache.path())
        .args(["verify", "not-a-key"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_status_json_on_empty_cache() {
    let cache = tempdir().unwrap();

    let output = better(cache.path())
        .args(["--json", "status"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["physicalBytes"], 0);
    assert_eq!(json["installRuns"], 0);
}

#[test]
fn test_gc_requires_policy() {
    let cache = tempdir().unwrap();

    let output = better(cache.path()).args(["gc"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_gc_dry_run_reports_zero_on_empty_cache() {
    let cache = tempdir().unwrap();

    let output = better(cache.path())
        .args(["--json", "gc", "--max-age-days", "30", "--dry-run"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["entriesRemoved"], 0);
    assert_eq!(json["dryRun"], true);
}

#[test]
fn test_marker_miss_without_install() {
    let cache = tempdir().unwrap();
    let project = tempdir().unwrap();
    seed_project(project.path());

    let output = better(cache.path())
        .args(["--json", "marker", "--node-major", "20", "--cwd"])
        .arg(project.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["hit"], false);
    assert_eq!(json["reason"], "marker_missing");
}
