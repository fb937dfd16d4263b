use assert_cmd::prelude::*;
use std::process::Command;

#[test]
fn help_lists_usage() {
    let mut cmd = Command::cargo_bin("xcp").unwrap();
    let output = cmd.arg("--help").output().unwrap();
    assert!(output.status.success(), "xcp --help should succeed");
    assert!(output.stderr.is_empty(), "help output should not write to stderr");
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("xcp"));
}

#[test]
fn without_operands_shows_usage_and_fails() {
    let mut cmd = Command::cargo_bin("xcp").unwrap();
    let output = cmd.output().unwrap();
    assert!(!output.status.success(), "running xcp without operands should fail");
    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);
    let combined = String::from_utf8(combined).unwrap();
    assert!(combined.contains("Usage:"));
}

#[test]
fn rejects_unknown_flag() {
    let mut cmd = Command::cargo_bin("xcp").unwrap();
    let output = cmd.arg("--definitely-not-a-flag").output().unwrap();
    assert!(!output.status.success());
}
