//! Smoke tests for the fwc binary
//!
//! Everything here must fail (or finish) before any container engine call,
//! so the tests run on machines without podman.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn fwc() -> Command {
    Command::cargo_bin("fwc").unwrap()
}

#[test]
fn help_lists_subcommands() {
    fwc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn check_missing_manifest_fails() {
    fwc()
        .args(["check", "does-not-exist.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn check_rejects_duplicate_firmwares() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("manifest.yml");
    fs::write(
        &manifest,
        r#"
firmwares:
  - version: "23.05.0"
    target: x86
    sub_target: "64"
    profile: generic
  - version: "23.05.0"
    target: x86
    sub_target: "64"
    profile: generic
"#,
    )
    .unwrap();

    fwc()
        .arg("check")
        .arg(&manifest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate firmwares"));
}

#[test]
fn check_accepts_valid_manifest() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("manifest.yml");
    fs::write(
        &manifest,
        r#"
firmwares:
  - version: "23.05.0"
    target: x86
    sub_target: "64"
    profile: generic
  - version: "23.05.0"
    target: x86
    sub_target: "64"
    profile: generic
    name: office
"#,
    )
    .unwrap();

    fwc()
        .arg("check")
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 firmware(s), manifest valid"))
        .stdout(predicate::str::contains(
            "openwrt-23.05.0-x86-64-generic-office",
        ));
}

#[test]
fn build_validates_manifest_before_anything_else() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("manifest.yml");
    fs::write(&manifest, "firmwares: [{target: x86}]").unwrap();

    fwc()
        .current_dir(dir.path())
        .arg("build")
        .arg(&manifest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid manifest"));

    // No work directory was created
    assert!(!dir.path().join("fwc").exists());
}
