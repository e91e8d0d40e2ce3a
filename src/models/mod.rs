//! Data models for tracker entities.
//!
//! This module defines the core data structures:
//! - `Challenge` - A time-boxed goal period with optional targets
//! - `Vulnerability` - A finding logged against a challenge, with its bounty
//! - `WorkSession` - Accumulated work minutes for one challenge on one day
//! - `ActivityLog` - Append-only record of heartbeat events
//!
//! Every entity serializes as a flat projection of its fields.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Minutes added to today's work session by each heartbeat.
pub const HEARTBEAT_MINUTES: i64 = 5;

/// Activity type recorded for heartbeat events.
pub const WORK_SESSION_ACTIVITY: &str = "work_session";

/// Severity of a vulnerability finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    /// Parse a severity, case-insensitive.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            _ => Err(format!(
                "Invalid severity: {} (expected Critical, High, Medium or Low)",
                s
            )),
        }
    }
}

/// A time-boxed bug bounty challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    /// Unique identifier, assigned by the store
    pub id: i64,

    /// Duration in days
    pub days: i64,

    /// Optional earnings goal
    pub target_money: Option<f64>,

    /// Optional number of findings to reach
    pub target_vulns: Option<i64>,

    pub start_time: DateTime<FixedOffset>,

    /// Always `start_time + days`
    pub end_time: DateTime<FixedOffset>,

    pub created_at: DateTime<FixedOffset>,

    /// Only the most recently created challenge is active
    pub is_active: bool,
}

impl Challenge {
    /// Build a new active challenge starting at `now`. The id is assigned on insert.
    ///
    /// Fails when `start + days` is not a representable RFC 3339 timestamp
    /// (four-digit year).
    pub fn new(
        days: i64,
        target_money: Option<f64>,
        target_vulns: Option<i64>,
        now: DateTime<FixedOffset>,
    ) -> Result<Self> {
        let end_time = TimeDelta::try_days(days)
            .and_then(|d| now.checked_add_signed(d))
            .filter(|end| end.year() <= 9999)
            .ok_or_else(|| Error::Validation(format!("days out of range: {}", days)))?;

        Ok(Self {
            id: 0,
            days,
            target_money,
            target_vulns,
            start_time: now,
            end_time,
            created_at: now,
            is_active: true,
        })
    }
}

/// A vulnerability logged against a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: i64,

    /// Owning challenge
    pub challenge_id: i64,

    pub title: String,

    pub severity: Severity,

    /// Program or company the finding was reported to
    pub company: Option<String>,

    /// Bounty awarded (may be negative when supplied that way)
    #[serde(default)]
    pub bounty: f64,

    pub description: Option<String>,

    pub created_at: DateTime<FixedOffset>,

    pub updated_at: DateTime<FixedOffset>,
}

/// Fields accepted when logging a new vulnerability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewVulnerability {
    pub challenge_id: i64,
    pub title: String,
    pub severity: Option<Severity>,
    pub company: Option<String>,
    pub bounty: Option<f64>,
    pub description: Option<String>,
}

/// Partial update for a vulnerability. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VulnerabilityUpdate {
    pub title: Option<String>,
    pub severity: Option<Severity>,
    pub company: Option<String>,
    pub bounty: Option<f64>,
    pub description: Option<String>,
}

impl VulnerabilityUpdate {
    /// True when no field would change.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.severity.is_none()
            && self.company.is_none()
            && self.bounty.is_none()
            && self.description.is_none()
    }

    /// Overwrite the supplied fields on `vuln`.
    pub fn apply_to(&self, vuln: &mut Vulnerability, now: DateTime<FixedOffset>) {
        if let Some(ref title) = self.title {
            vuln.title = title.clone();
        }
        if let Some(severity) = self.severity {
            vuln.severity = severity;
        }
        // An empty company or description clears the field
        if let Some(ref company) = self.company {
            vuln.company = Some(company.clone()).filter(|c| !c.is_empty());
        }
        if let Some(bounty) = self.bounty {
            vuln.bounty = bounty;
        }
        if let Some(ref description) = self.description {
            vuln.description = Some(description.clone()).filter(|d| !d.is_empty());
        }
        vuln.updated_at = now;
    }
}

/// Work minutes accumulated for one challenge on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSession {
    pub id: i64,
    pub challenge_id: i64,

    /// Calendar day in the time provider's timezone
    pub date: NaiveDate,

    pub minutes: i64,
    pub last_activity: DateTime<FixedOffset>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

impl WorkSession {
    /// Minutes converted to hours.
    pub fn hours(&self) -> f64 {
        self.minutes as f64 / 60.0
    }
}

/// Append-only audit record of an activity ping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: i64,
    pub challenge_id: i64,
    pub timestamp: DateTime<FixedOffset>,
    pub activity_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,
}
