//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary against a throwaway data directory shared
//! by the primary and companion invocations.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_pomolink-cli"))
        .env("POMOLINK_DATA_DIR", dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn run_json(dir: &Path, args: &[&str]) -> serde_json::Value {
    let (code, stdout, stderr) = run_cli(dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

// ============================================================================
// Timer
// ============================================================================

#[test]
fn test_timer_status_defaults_to_idle_work() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["type"], "state_snapshot");
    assert_eq!(status["status"], "idle");
    assert_eq!(status["kind"], "work");
    assert_eq!(status["remaining_secs"], 1500);
}

#[test]
fn test_timer_start_then_pause() {
    let dir = tempfile::tempdir().unwrap();
    let started = run_json(dir.path(), &["timer", "start"]);
    assert_eq!(started["type"], "timer_started");

    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["status"], "running");

    let paused = run_json(dir.path(), &["timer", "pause"]);
    assert_eq!(paused["type"], "timer_paused");
}

#[test]
fn test_invalid_transition_prints_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_json(dir.path(), &["timer", "pause"]);
    assert_eq!(out["type"], "state_snapshot");
    assert_eq!(out["status"], "idle");
}

#[test]
fn test_timer_kind_change() {
    let dir = tempfile::tempdir().unwrap();
    let changed = run_json(dir.path(), &["timer", "kind", "long-break"]);
    assert_eq!(changed["type"], "kind_changed");
    assert_eq!(changed["to"], "long_break");

    let (code, _, _) = run_cli(dir.path(), &["timer", "kind", "nap"]);
    assert_ne!(code, 0);
}

#[test]
fn test_skip_records_session() {
    let dir = tempfile::tempdir().unwrap();
    run_json(dir.path(), &["timer", "start"]);
    let skipped = run_json(dir.path(), &["timer", "skip"]);
    assert_eq!(skipped["type"], "session_completed");
    assert_eq!(skipped["next_kind"], "short_break");
    assert_eq!(skipped["record"]["was_completed_not_skipped"], false);

    let sessions = run_json(dir.path(), &["sync", "sessions"]);
    assert_eq!(sessions.as_array().unwrap().len(), 1);
}

// ============================================================================
// Peer sync
// ============================================================================

#[test]
fn test_companion_sees_primary_start() {
    let dir = tempfile::tempdir().unwrap();
    run_json(dir.path(), &["--surface", "primary", "timer", "start"]);

    let status = run_json(dir.path(), &["--surface", "companion", "timer", "status"]);
    assert_eq!(status["status"], "running");
    assert_eq!(status["kind"], "work");
}

#[test]
fn test_skip_on_companion_reaches_primary_stats() {
    let dir = tempfile::tempdir().unwrap();
    run_json(dir.path(), &["timer", "start"]);
    run_json(dir.path(), &["--surface", "companion", "sync", "pull"]);
    run_json(dir.path(), &["--surface", "companion", "timer", "skip"]);

    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["status"], "idle");
    assert_eq!(status["kind"], "short_break");
    let sessions = run_json(dir.path(), &["sync", "sessions"]);
    assert_eq!(sessions[0]["origin_surface"], "companion");
}

// ============================================================================
// Ambient
// ============================================================================

#[test]
fn test_ambient_request_is_consumed_by_primary() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(dir.path(), &["ambient", "request", "play"]);
    assert_eq!(code, 0);

    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["status"], "running");

    let shown = run_json(dir.path(), &["ambient", "show"]);
    assert!(shown["pending_action"].is_null());
    assert_eq!(shown["snapshot"]["is_running"], true);
}

#[test]
fn test_companion_ignores_ambient_token() {
    let dir = tempfile::tempdir().unwrap();
    run_cli(dir.path(), &["ambient", "request", "play"]);
    let status = run_json(dir.path(), &["--surface", "companion", "timer", "status"]);
    assert_eq!(status["status"], "idle");

    let shown = run_json(dir.path(), &["ambient", "show"]);
    assert_eq!(shown["pending_action"]["action"], "play");
}

// ============================================================================
// Config & stats
// ============================================================================

#[test]
fn test_config_set_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["config", "set", "timer.work_minutes", "30"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (_, value, _) = run_cli(dir.path(), &["config", "get", "timer.work_minutes"]);
    assert_eq!(value.trim(), "30");

    // The idle display picks up the new duration.
    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["remaining_secs"], 1800);
}

#[test]
fn test_config_list_and_effective_settings() {
    let dir = tempfile::tempdir().unwrap();
    let listed = run_json(dir.path(), &["config", "list"]);
    assert_eq!(listed["timer.work_minutes"], "25");
    assert_eq!(listed["sync.ambient_poll_ms"], "500");

    run_cli(dir.path(), &["config", "set", "timer.short_break_minutes", "7"]);
    run_json(dir.path(), &["timer", "status"]);
    let effective = run_json(dir.path(), &["--surface", "companion", "config", "effective"]);
    assert_eq!(effective["short_break_minutes"], 7);
    assert_eq!(effective["work_minutes"], 25);
}

#[test]
fn test_config_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(dir.path(), &["config", "set", "timer.work_minutes", "0"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));

    let (code, _, _) = run_cli(dir.path(), &["config", "get", "timer.nope"]);
    assert_ne!(code, 0);
}

#[test]
fn test_stats_today_and_week() {
    let dir = tempfile::tempdir().unwrap();
    let today = run_json(dir.path(), &["stats", "today"]);
    assert_eq!(today["today"]["completed_work"], 0);
    assert_eq!(today["streak"], 0);

    let week = run_json(dir.path(), &["stats", "week"]);
    assert_eq!(week.as_array().unwrap().len(), 7);
}
