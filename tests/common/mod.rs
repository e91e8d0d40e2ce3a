//! Common test utilities for bounty tracker integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's real data or config directories.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with isolated data storage.
///
/// - `data_dir`: Holds tracker.db and config.kdl (via `BT_DATA_DIR`)
/// - `config_home`: Stands in for `~/.config` so no system config is read
///
/// The `bt()` method returns a `Command` with both set per-invocation and the
/// local clock forced, making tests parallel-safe and network-free.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub config_home: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            config_home: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the bt binary with an isolated data directory.
    pub fn bt(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_bt"));
        cmd.env("BT_DATA_DIR", self.data_dir.path());
        cmd.env("XDG_CONFIG_HOME", self.config_home.path());
        cmd.env("BT_OFFLINE", "1");
        cmd.env_remove("BT_HOST");
        cmd.env_remove("BT_PORT");
        cmd.env_remove("BT_UTC_OFFSET_HOURS");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Run a command expected to succeed and parse its JSON output.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.bt().args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).unwrap()
    }

    /// Create a challenge and return its id.
    pub fn create_challenge(&self, days: i64) -> i64 {
        let challenge = self.json(&["challenge", "create", &days.to_string()]);
        challenge["id"].as_i64().unwrap()
    }

    /// Log a finding and return its id.
    pub fn add_vuln(&self, challenge_id: i64, title: &str, severity: &str, bounty: &str) -> i64 {
        let vuln = self.json(&[
            "vuln",
            "add",
            &challenge_id.to_string(),
            title,
            "--severity",
            severity,
            "--bounty",
            bounty,
        ]);
        vuln["id"].as_i64().unwrap()
    }

    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
