//! CLI Integration Tests
//!
//! These tests run the `neutralsync` binary end-to-end.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

fn cli_cmd() -> Command {
    Command::cargo_bin("neutralsync").expect("Failed to find neutralsync binary")
}

/// An address nothing is listening on
fn dead_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

fn write_raw(dir: &TempDir, file: &str, lines: &[&str]) {
    let raw = dir.path().join("raw");
    fs::create_dir_all(&raw).unwrap();
    fs::write(raw.join(file), format!("{}\n", lines.join("\n"))).unwrap();
}

// ============================================================================
// Help
// ============================================================================

#[test]
fn test_help_lists_commands() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scheduler"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("load"))
        .stdout(predicate::str::contains("execute"))
        .stdout(predicate::str::contains("timeline"));
}

#[test]
fn test_scheduler_requires_executor() {
    cli_cmd()
        .arg("scheduler")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--executor"));
}

#[test]
fn test_load_requires_names() {
    cli_cmd()
        .args(["load", "--executor", "127.0.0.1:5000"])
        .assert()
        .failure();
}

// ============================================================================
// Driver Commands
// ============================================================================

#[test]
fn test_start_against_dead_executor_fails() {
    let addr = dead_addr();
    cli_cmd()
        .args(["start", "--executor", &addr, "--connect-timeout-ms", "500"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("start failed"));
}

#[test]
fn test_execute_against_dead_executor_fails() {
    let addr = dead_addr();
    cli_cmd()
        .args(["execute", "--executor", &addr, "Clock"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("executeNeutralComponents failed"));
}

// ============================================================================
// Timeline
// ============================================================================

#[test]
fn test_timeline_empty_dir() {
    let dir = TempDir::new().unwrap();
    cli_cmd()
        .args(["timeline", "--log-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No log records"));
}

#[test]
fn test_timeline_merges_participants() {
    let dir = TempDir::new().unwrap();
    write_raw(
        &dir,
        "2026-10-19_executor-emu.jsonl",
        &[
            r#"{"ts":"2026-10-19T09:00:00.100Z","level":"info","role":"executor","instance":"emu","target":"t","msg":"Connecting to scheduler"}"#,
            r#"{"ts":"2026-10-19T09:00:01.000Z","level":"debug","role":"executor","instance":"emu","target":"t","msg":"At injection site","fields":{"action":"click"}}"#,
        ],
    );
    write_raw(
        &dir,
        "2026-10-19_scheduler-6000.jsonl",
        &[r#"{"ts":"2026-10-19T09:00:00.200Z","level":"info","role":"scheduler","instance":"6000","target":"t","msg":"Executor ready"}"#],
    );

    let output = cli_cmd()
        .args(["timeline", "--log-dir"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("[executor-emu] Connecting to scheduler"));
    assert!(lines[1].contains("[scheduler-6000] Executor ready"));
    assert!(lines[2].ends_with("At injection site action=click"));
}

#[test]
fn test_timeline_date_filter() {
    let dir = TempDir::new().unwrap();
    write_raw(
        &dir,
        "2026-10-18_executor-emu.jsonl",
        &[r#"{"ts":"2026-10-18T09:00:00.000Z","level":"info","role":"executor","instance":"emu","target":"t","msg":"Yesterday"}"#],
    );
    write_raw(
        &dir,
        "2026-10-19_executor-emu.jsonl",
        &[r#"{"ts":"2026-10-19T09:00:00.000Z","level":"info","role":"executor","instance":"emu","target":"t","msg":"Today"}"#],
    );

    cli_cmd()
        .args(["timeline", "--date", "2026-10-19", "--log-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Today"))
        .stdout(predicate::str::contains("Yesterday").not());
}
