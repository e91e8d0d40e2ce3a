//! Command implementations for the tracker.
//!
//! This module contains the business logic shared by the CLI and the HTTP
//! server. Commands are organized by entity:
//! - `challenge` - challenge lifecycle and progress
//! - `vulnerability` - the vulnerability ledger
//! - `session` - heartbeat-driven work sessions and the activity log
//! - `report` - analytics views
//!
//! Every command takes the store and, when it writes timestamps, a [`Clock`].
//! "Now" is read once per command.
//!
//! [`Clock`]: crate::clock::Clock

pub mod challenge;
pub mod report;
pub mod session;
pub mod vulnerability;

pub use challenge::{
    ChallengeDeleted, ChallengeDetail, ChallengeList, ChallengeProgress, challenge_active,
    challenge_create, challenge_delete, challenge_list, challenge_progress, challenge_show,
};
pub use report::{AnalyticsOverview, analytics_for, analytics_overview};
pub use session::{ActivityList, Heartbeat, TodayMinutes, activity_log, heartbeat, today_minutes};
pub use vulnerability::{
    VulnerabilityDeleted, VulnerabilityList, total_bounty, vuln_add, vuln_delete, vuln_edit,
    vuln_list,
};

use crate::models::Challenge;
use crate::{Error, Result};
use serde::Serialize;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// Serialize any result to a JSON string, falling back to an error object.
pub(crate) fn json_string<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {}"}}"#, e))
}

impl Output for Challenge {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format_challenge_line(self)
    }
}

impl Output for Option<Challenge> {
    fn to_json(&self) -> String {
        json_string(&serde_json::json!({ "challenge": self }))
    }

    fn to_human(&self) -> String {
        match self {
            Some(challenge) => format_challenge_line(challenge),
            None => "No active challenge.".to_string(),
        }
    }
}

/// One-line summary of a challenge.
pub(crate) fn format_challenge_line(challenge: &Challenge) -> String {
    let mut line = format!(
        "#{} {} days, {} -> {}",
        challenge.id,
        challenge.days,
        challenge.start_time.format("%Y-%m-%d %H:%M"),
        challenge.end_time.format("%Y-%m-%d %H:%M"),
    );
    if let Some(money) = challenge.target_money {
        line.push_str(&format!(", target ${:.2}", money));
    }
    if let Some(vulns) = challenge.target_vulns {
        line.push_str(&format!(", target {} vulns", vulns));
    }
    if challenge.is_active {
        line.push_str(" [active]");
    }
    line
}

// === Input parsing ===
//
// Form fields arrive as strings. Empty strings mean "not supplied".

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a required integer field.
pub fn parse_required_i64(field: &str, raw: Option<&str>) -> Result<i64> {
    let value = non_empty(raw).ok_or_else(|| Error::Validation(format!("{} is required", field)))?;
    value.parse::<i64>().map_err(|_| {
        Error::Validation(format!("{} must be a whole number, got '{}'", field, value))
    })
}

/// Parse an optional integer field. Empty means absent.
pub fn parse_optional_i64(field: &str, raw: Option<&str>) -> Result<Option<i64>> {
    non_empty(raw)
        .map(|value| {
            value.parse::<i64>().map_err(|_| {
                Error::Validation(format!("{} must be a whole number, got '{}'", field, value))
            })
        })
        .transpose()
}

/// Parse an optional number field. Empty means absent; garbage is rejected.
pub fn parse_optional_f64(field: &str, raw: Option<&str>) -> Result<Option<f64>> {
    non_empty(raw)
        .map(|value| match value.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(Error::Validation(format!(
                "{} must be a number, got '{}'",
                field, value
            ))),
        })
        .transpose()
}

/// Parse a bounty for a new finding: absent, unparseable or non-finite is 0.
pub fn parse_bounty_lenient(raw: Option<&str>) -> f64 {
    non_empty(raw)
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

/// Trim an optional free-text field; empty becomes `None`.
pub fn normalize_text(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
