use assert_cmd::prelude::*;
use std::process::Command;

#[test]
fn help_lists_usage() {
    let mut cmd = Command::cargo_bin("xcpd").unwrap();
    let output = cmd.arg("--help").output().unwrap();
    assert!(output.status.success(), "xcpd --help should succeed");
    assert!(output.stderr.is_empty(), "help output should not write to stderr");
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("xcpd"));
}

#[test]
fn rejects_unknown_flag() {
    let mut cmd = Command::cargo_bin("xcpd").unwrap();
    let output = cmd.arg("--definitely-not-a-flag").output().unwrap();
    assert!(!output.status.success());
}
