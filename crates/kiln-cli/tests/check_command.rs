//! `kiln check` prints the configuration a build would use.

mod helpers;

use assert_cmd::Command;
use helpers::*;
use predicates::prelude::*;

fn kiln() -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.env_remove("KILN_MODE").env_remove("NODE_ENV").env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_check_prints_effective_toml() {
    let dir = project();

    kiln()
        .args(["check", "--root"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("mode = \"development\""))
        .stdout(predicate::str::contains("minify = false"));
}

#[test]
fn test_check_follows_kiln_mode() {
    let dir = project();

    kiln()
        .env("KILN_MODE", "production")
        .args(["check", "--format", "json", "--root"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mode\": \"production\""))
        .stdout(predicate::str::contains("\"minify\": true"));
}

#[test]
fn test_check_reports_missing_entry() {
    let dir = project();
    std::fs::remove_file(dir.path().join("src/main.js")).unwrap();

    kiln()
        .args(["check", "--root"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("entry 'main' not found"));
}

#[test]
fn test_check_fs_requires_public_dir() {
    let dir = project();
    std::fs::remove_dir_all(dir.path().join("public")).unwrap();

    kiln()
        .args(["check", "--fs", "--format", "none", "--root"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("public_dir"));
}

#[test]
fn test_env_overrides_file_values() {
    let dir = project();

    kiln()
        .env("KILN_DEV__PORT", "4321")
        .args(["check", "--root"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("port = 4321"));
}
