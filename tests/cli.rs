//! Exit codes and diagnostics of the `markout` binary
#![cfg(feature = "cdp")]

use std::process::Command;

fn markout() -> Command {
    Command::new(env!("CARGO_BIN_EXE_markout"))
}

#[test]
fn missing_input_prints_diagnostic_with_logging_off() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("absent.md");

    let out = markout()
        .arg(&missing)
        .env("RUST_LOG", "off")
        .env("MARKOUT_OUTPUT_DIR", tmp.path())
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("absent.md"), "no diagnostic on stderr: {stderr:?}");
}

#[test]
fn missing_argument_exits_one() {
    let out = markout().env("RUST_LOG", "off").output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(!out.stderr.is_empty());
}
