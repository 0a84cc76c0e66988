//! Binary behaviour of the `eventd` command

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Write a config keeping every socket and file inside `dir`
fn write_config(dir: &Path) -> std::path::PathBuf {
    let yaml = format!(
        "transport:\n  ingress: ipc://{dir}/ingress.sock\n  egress: {dir}/egress.sock\n  capture: {dir}/capture.sock\n  control: {dir}/control.sock\nstats:\n  db-path: {dir}/counters.db\n",
        dir = dir.display()
    );
    let path = dir.join("eventd.yml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn eventd() -> Command {
    Command::cargo_bin("eventd").unwrap()
}

#[test]
fn test_version() {
    eventd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_lists_commands() {
    eventd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run").and(predicate::str::contains("ctl")));
}

#[test]
fn test_config_prints_effective_yaml() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    eventd()
        .arg("--config")
        .arg(&config)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingress: ipc://"))
        .stdout(predicate::str::contains("control.sock"))
        .stdout(predicate::str::contains("max-events: 100000"))
        .stdout(predicate::str::contains("table: COUNTERS_EVENTS"));
}

#[test]
fn test_bad_config_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("eventd.yml");
    std::fs::write(&config, "stats:\n  heartbeat-interval-secs: -5\n").unwrap();

    eventd()
        .arg("--config")
        .arg(&config)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_ctl_without_daemon_fails() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    eventd()
        .arg("--config")
        .arg(&config)
        .args(["ctl", "echo", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to connect to daemon"));
}

#[test]
fn test_publish_without_daemon_fails() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    eventd()
        .arg("--config")
        .arg(&config)
        .args(["publish", "test.subject", "{}"])
        .assert()
        .failure();
}

#[test]
fn test_missing_subcommand_is_usage_error() {
    eventd().assert().failure().stderr(predicate::str::contains("Usage"));
}
