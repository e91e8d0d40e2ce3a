//! Bounty Tracker - a work tracker for time-boxed bug bounty challenges.
//!
//! This library provides the core functionality for the `bt` CLI and its
//! HTTP server: challenge lifecycle, the vulnerability ledger, heartbeat-driven
//! work-session accounting and simple analytics.

pub mod analytics;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod models;
pub mod server;
pub mod storage;

/// Short git commit the binary was built from.
pub const GIT_COMMIT: &str = env!("BT_GIT_COMMIT");

/// Build timestamp (ISO 8601, UTC).
pub const BUILD_TIMESTAMP: &str = env!("BT_BUILD_TIMESTAMP");

/// Test utilities for isolated test environments.
#[cfg(test)]
pub(crate) mod test_utils {
    use chrono::{DateTime, FixedOffset};
    use tempfile::TempDir;

    use crate::clock::FixedClock;
    use crate::storage::Storage;

    /// Test environment with an isolated data directory and a pinned clock.
    pub struct TestEnv {
        /// Isolated data storage directory
        pub data_dir: TempDir,
        pub clock: FixedClock,
    }

    impl TestEnv {
        /// Create a new test environment pinned to 2026-03-01 10:00 (UTC+2).
        pub fn new() -> Self {
            Self {
                data_dir: TempDir::new().unwrap(),
                clock: FixedClock::new(at("2026-03-01T10:00:00+02:00")),
            }
        }

        /// Open storage for this test environment.
        pub fn storage(&self) -> Storage {
            Storage::open_with_data_dir(self.data_dir.path()).unwrap()
        }
    }

    impl Default for TestEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Parse an RFC 3339 timestamp.
    pub fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }
}

/// Library-level error type for tracker operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Bad or missing user input.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The external time service could not be used. Recovered by the clock's fallback.
    #[error("Time service error: {0}")]
    ExternalService(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, Error>;
