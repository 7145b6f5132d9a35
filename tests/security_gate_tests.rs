//! Security gate path and origin checks, including traversal attempts
//! through not-yet-existing files and symlinks.

use std::path::{Path, PathBuf};

use browser_relay::{ErrorCode, SecurityGate};

struct Dirs {
    _tmp: tempfile::TempDir,
    root: PathBuf,
    gate: SecurityGate,
}

fn setup(origins: Vec<String>) -> Dirs {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().to_path_buf();
    for sub in ["input", "output", "logs", "outside"] {
        std::fs::create_dir_all(root.join(sub)).unwrap();
    }
    let gate = SecurityGate::new(
        &root.join("input"),
        &root.join("output"),
        &root.join("logs"),
        true,
        origins,
    );
    Dirs { _tmp: tmp, root, gate }
}

#[test]
fn writes_resolve_only_under_output_and_logs() {
    let dirs = setup(vec![]);
    assert!(dirs.gate.resolve_write(&dirs.root.join("output/a.txt")).is_ok());
    assert!(dirs.gate.resolve_write(&dirs.root.join("output/nested/deep/a.txt")).is_ok());
    assert!(dirs.gate.resolve_write(&dirs.root.join("logs/session.log")).is_ok());
    assert!(dirs.gate.resolve_write(&dirs.root.join("input/a.txt")).is_err());
    assert!(dirs.gate.resolve_write(&dirs.root.join("outside/a.txt")).is_err());
    assert!(dirs.gate.resolve_write(Path::new("/etc/passwd")).is_err());
}

#[test]
fn reads_resolve_under_all_three_roots() {
    let dirs = setup(vec![]);
    std::fs::write(dirs.root.join("input/profile.json"), b"{}").unwrap();
    assert!(dirs.gate.resolve_read(&dirs.root.join("input/profile.json")).is_ok());
    assert!(dirs.gate.resolve_read(&dirs.root.join("output")).is_ok());
    assert!(dirs.gate.resolve_read(&dirs.root.join("outside")).is_err());
}

#[test]
fn dot_dot_traversal_is_rejected() {
    let dirs = setup(vec![]);
    let escape = dirs.root.join("output/../outside/escape.txt");
    let err = dirs.gate.resolve_write(&escape).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Permission);

    // Traversal hidden behind a non-existent directory.
    let hidden = dirs.root.join("output/newdir/../../outside/escape.txt");
    assert!(dirs.gate.resolve_write(&hidden).is_err());
}

#[cfg(unix)]
#[test]
fn symlinks_cannot_smuggle_writes_out() {
    let dirs = setup(vec![]);
    let link = dirs.root.join("output/link");
    std::os::unix::fs::symlink(dirs.root.join("outside"), &link).unwrap();
    let err = dirs.gate.resolve_write(&link.join("escape.txt")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Permission);
}

#[test]
fn resolved_write_paths_stay_inside_the_allowlist() {
    let dirs = setup(vec![]);
    let resolved = dirs.gate.resolve_write(&dirs.root.join("output/sub/file.bin")).unwrap();
    let output_root = dirs.root.join("output").canonicalize().unwrap();
    assert!(resolved.starts_with(output_root));
}

#[test]
fn evaluate_origin_gate_matches_exactly() {
    let dirs = setup(vec!["https://app.example.com".into()]);
    assert!(dirs.gate.check_evaluate_origin("https://app.example.com/dashboard").is_ok());
    assert!(dirs.gate.check_evaluate_origin("https://evil.example.com/").is_err());
    assert!(dirs.gate.check_evaluate_origin("http://app.example.com/").is_err());

    let err = dirs.gate.check_evaluate_origin("not a url").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Permission);
}

#[test]
fn evaluate_wildcard_allows_any_origin() {
    let dirs = setup(vec!["*".into()]);
    assert!(dirs.gate.check_evaluate_origin("https://anything.test/x").is_ok());
    assert!(dirs.gate.check_evaluate_origin("http://localhost:3000/").is_ok());
}
