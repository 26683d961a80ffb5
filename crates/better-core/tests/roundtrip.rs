//! Capture → restore round-trip fidelity.
//!
//! After capturing a project's `node_modules` and restoring the entry into a
//! fresh project, the restored tree must have the same relative paths, file
//! contents, symlink targets, and executable bits as the original.

use better_core::{
    capture, derive_key, restore, CacheLayout, CacheOptions, CancelToken, Host, LinkStrategy,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn host() -> Host {
    Host {
        platform: String::from("linux"),
        arch: String::from("x64"),
        node_major: Some(20),
        libc: String::from("glibc-2.35"),
    }
}

/// Build a representative node_modules: nested packages, a scoped package,
/// an executable, and (on Unix) a `.bin` symlink.
fn build_tree(project_root: &Path) {
    let nm = project_root.join("node_modules");
    fs::create_dir_all(nm.join("lodash").join("fp")).unwrap();
    fs::write(nm.join("lodash").join("index.js"), b"module.exports = {};\n").unwrap();
    fs::write(nm.join("lodash").join("fp").join("map.js"), b"// fp map\n").unwrap();

    fs::create_dir_all(nm.join("@scope").join("pkg")).unwrap();
    fs::write(
        nm.join("@scope").join("pkg").join("package.json"),
        b"{\"name\":\"@scope/pkg\"}\n",
    )
    .unwrap();

    let cli = nm.join("lodash").join("cli.js");
    fs::write(&cli, b"#!/usr/bin/env node\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&cli).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&cli, perms).unwrap();

        fs::create_dir_all(nm.join(".bin")).unwrap();
        std::os::unix::fs::symlink("../lodash/cli.js", nm.join(".bin").join("lodash-cli"))
            .unwrap();
    }

    fs::write(project_root.join("package-lock.json"), b"{\"lockfileVersion\":3}").unwrap();
}

/// Map of relative path → (kind, detail) describing a tree.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, (String, String)> {
    let mut out = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.unwrap();
        let rel = entry.path().strip_prefix(root).unwrap().to_path_buf();
        if rel.as_os_str().is_empty() {
            continue;
        }
        let ft = entry.file_type();
        let (kind, detail) = if ft.is_symlink() {
            (
                "symlink".to_string(),
                fs::read_link(entry.path())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned(),
            )
        } else if ft.is_dir() {
            ("dir".to_string(), String::new())
        } else {
            let contents = fs::read(entry.path()).unwrap();
            #[cfg(unix)]
            let mode = {
                use std::os::unix::fs::PermissionsExt;
                fs::metadata(entry.path()).unwrap().permissions().mode() & 0o111
            };
            #[cfg(not(unix))]
            let mode = 0;
            (
                "file".to_string(),
                format!("{}:{mode:o}", better_util::hash::sha256_bytes(&contents)),
            )
        };
        out.insert(rel, (kind, detail));
    }
    out
}

fn roundtrip_with(strategy: LinkStrategy) {
    let cache = tempdir().unwrap();
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();

    build_tree(source.path());
    let layout = CacheLayout::at_root(cache.path());
    let opts = CacheOptions {
        link_strategy: strategy,
        ..CacheOptions::default()
    };

    let derivation = derive_key(source.path(), &host(), &opts).unwrap();
    let derived = derivation.eligible().unwrap();

    capture(&layout, derived, source.path(), &opts, &CancelToken::new()).unwrap();

    let before = snapshot(&source.path().join("node_modules"));
    fs::remove_dir_all(source.path().join("node_modules")).unwrap();

    restore(
        &layout,
        &derived.key,
        target.path(),
        strategy,
        8,
        &CancelToken::new(),
    )
    .unwrap();

    let after = snapshot(&target.path().join("node_modules"));
    assert_eq!(before, after);
}

#[test]
fn roundtrip_copy_preserves_tree() {
    roundtrip_with(LinkStrategy::Copy);
}

#[cfg(unix)]
#[test]
fn roundtrip_hardlink_preserves_tree() {
    roundtrip_with(LinkStrategy::Hardlink);
}

#[test]
fn roundtrip_auto_preserves_tree() {
    roundtrip_with(LinkStrategy::Auto);
}

#[cfg(unix)]
#[test]
fn hardlink_restore_shares_every_inode_with_entry() {
    use std::os::unix::fs::MetadataExt;

    let cache = tempdir().unwrap();
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();

    build_tree(source.path());
    let layout = CacheLayout::at_root(cache.path());
    let opts = CacheOptions::default();

    let derivation = derive_key(source.path(), &host(), &opts).unwrap();
    let derived = derivation.eligible().unwrap();
    capture(&layout, derived, source.path(), &opts, &CancelToken::new()).unwrap();

    restore(
        &layout,
        &derived.key,
        target.path(),
        LinkStrategy::Hardlink,
        8,
        &CancelToken::new(),
    )
    .unwrap();

    let entry_nm = layout.entry_paths(&derived.key).node_modules;
    let restored_nm = target.path().join("node_modules");
    for entry in walkdir::WalkDir::new(&restored_nm) {
        let entry = entry.unwrap();
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(&restored_nm).unwrap();
        let in_entry = entry_nm.join(rel);
        assert_eq!(
            fs::metadata(entry.path()).unwrap().ino(),
            fs::metadata(&in_entry).unwrap().ino(),
            "inode mismatch for {rel:?}"
        );
    }
}
