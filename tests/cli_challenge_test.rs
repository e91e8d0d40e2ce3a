//! Integration tests for challenge commands via CLI.
//!
//! - `bt challenge create/list/active/show/progress/delete`
//! - JSON and human-readable output formats
//! - Error output and exit codes

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_challenge_create_json() {
    let env = TestEnv::new();

    let challenge = env.json(&[
        "challenge",
        "create",
        "7",
        "--target-money",
        "1500",
        "--target-vulns",
        "4",
    ]);
    assert_eq!(challenge["days"], 7);
    assert_eq!(challenge["target_money"], 1500.0);
    assert_eq!(challenge["target_vulns"], 4);
    assert_eq!(challenge["is_active"], true);
    assert!(challenge["start_time"].as_str().unwrap().ends_with("+02:00"));
}

#[test]
fn test_challenge_create_human() {
    let env = TestEnv::new();

    env.bt()
        .args(["challenge", "create", "30", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#1 30 days"))
        .stdout(predicate::str::contains("[active]"));
}

#[test]
fn test_challenge_create_rejects_zero_days() {
    let env = TestEnv::new();

    env.bt()
        .args(["challenge", "create", "0"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("\"error\""))
        .stderr(predicate::str::contains("greater than 0"));

    env.bt()
        .args(["challenge", "create", "0", "-H"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}

#[test]
fn test_only_latest_challenge_is_active() {
    let env = TestEnv::new();
    let first = env.create_challenge(7);
    let second = env.create_challenge(14);

    let active = env.json(&["challenge", "active"]);
    assert_eq!(active["challenge"]["id"], second);

    let list = env.json(&["challenge", "list"]);
    let challenges = list["challenges"].as_array().unwrap();
    assert_eq!(challenges.len(), 2);
    let active_count = challenges
        .iter()
        .filter(|c| c["is_active"] == true)
        .count();
    assert_eq!(active_count, 1);
    assert_eq!(list["current_challenge"]["id"], second);

    let shown = env.json(&["challenge", "show", &first.to_string()]);
    assert_eq!(shown["challenge"]["is_active"], false);
}

#[test]
fn test_challenge_active_when_empty() {
    let env = TestEnv::new();

    env.bt()
        .args(["challenge", "active"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"challenge\":null"));

    env.bt()
        .args(["challenge", "active", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No active challenge."));
}

#[test]
fn test_challenge_show_and_progress() {
    let env = TestEnv::new();
    let id = env.create_challenge(7);
    env.add_vuln(id, "IDOR", "High", "500");
    env.add_vuln(id, "Open redirect", "High", "250");

    let detail = env.json(&["challenge", "show", &id.to_string()]);
    assert_eq!(detail["total_earned"], 750.0);
    assert_eq!(detail["vulnerabilities"].as_array().unwrap().len(), 2);
    assert_eq!(detail["today_work_minutes"], 0);

    let progress = env.json(&["challenge", "progress", &id.to_string()]);
    assert_eq!(progress["days_elapsed"], 0);
    assert_eq!(progress["days_remaining"], 7);
    assert_eq!(progress["vulnerability_count"], 2);
    assert_eq!(progress["ended"], false);
}

#[test]
fn test_challenge_show_missing() {
    let env = TestEnv::new();

    env.bt()
        .args(["challenge", "show", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Challenge not found: 42"));
}

#[test]
fn test_challenge_delete_cascades() {
    let env = TestEnv::new();
    let id = env.create_challenge(7);
    env.add_vuln(id, "SSRF", "Critical", "2000");
    env.bt()
        .args(["heartbeat", &id.to_string()])
        .assert()
        .success();

    let deleted = env.json(&["challenge", "delete", &id.to_string()]);
    assert_eq!(deleted["removed"]["vulnerabilities"], 1);
    assert_eq!(deleted["removed"]["work_sessions"], 1);
    assert_eq!(deleted["removed"]["activity_logs"], 1);

    let overview = env.json(&["analytics"]);
    assert!(overview["challenges"].as_array().unwrap().is_empty());
    assert!(overview["work_sessions"].as_array().unwrap().is_empty());
    assert!(overview["vulnerabilities"].as_array().unwrap().is_empty());

    env.bt()
        .args(["challenge", "delete", &id.to_string()])
        .assert()
        .failure();
}

#[test]
fn test_data_dir_flag_overrides_env() {
    let env = TestEnv::new();
    let other = common::TempDir::new().unwrap();

    env.bt()
        .args(["challenge", "create", "3", "--data-dir"])
        .arg(other.path())
        .assert()
        .success();

    assert!(other.path().join("tracker.db").exists());
    let list = env.json(&["challenge", "list"]);
    assert!(list["challenges"].as_array().unwrap().is_empty());
}
