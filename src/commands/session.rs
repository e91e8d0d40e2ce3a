//! Heartbeat-driven work sessions and the activity log.

use chrono::NaiveDate;
use serde::Serialize;

use super::{Output, json_string};
use crate::clock::Clock;
use crate::models::{ActivityLog, HEARTBEAT_MINUTES, WORK_SESSION_ACTIVITY};
use crate::storage::Storage;
use crate::{Error, Result};

/// Outcome of one heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heartbeat {
    pub challenge_id: i64,
    pub date: NaiveDate,
    /// Minutes recorded for the day after this heartbeat
    pub total_minutes: i64,
}

impl Output for Heartbeat {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Challenge #{}: {} minutes worked on {}",
            self.challenge_id, self.total_minutes, self.date
        )
    }
}

/// Credit five minutes of work to the challenge for today.
///
/// The session upsert and the activity entry are written in one transaction,
/// so concurrent heartbeats never lose an increment.
pub fn heartbeat(
    storage: &mut Storage,
    clock: &dyn Clock,
    challenge_id: Option<i64>,
) -> Result<Heartbeat> {
    let challenge_id = match challenge_id {
        Some(id) if id != 0 => id,
        _ => return Err(Error::Validation("No active challenge".to_string())),
    };

    let now = clock.now();
    let session =
        storage.record_heartbeat(challenge_id, now, HEARTBEAT_MINUTES, WORK_SESSION_ACTIVITY)?;
    tracing::debug!(
        challenge_id,
        date = %session.date,
        minutes = session.minutes,
        "Heartbeat recorded"
    );

    Ok(Heartbeat {
        challenge_id,
        date: session.date,
        total_minutes: session.minutes,
    })
}

/// Minutes worked today on one challenge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayMinutes {
    pub challenge_id: i64,
    pub date: NaiveDate,
    pub minutes: i64,
}

impl Output for TodayMinutes {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!(
            "{} minutes ({:.1} hours) on {}",
            self.minutes,
            self.minutes as f64 / 60.0,
            self.date
        )
    }
}

pub fn today_minutes(
    storage: &Storage,
    clock: &dyn Clock,
    challenge_id: i64,
) -> Result<TodayMinutes> {
    if !storage.challenge_exists(challenge_id)? {
        return Err(Error::NotFound(format!("Challenge not found: {}", challenge_id)));
    }
    let date = clock.now().date_naive();
    let minutes = storage
        .get_session(challenge_id, date)?
        .map(|s| s.minutes)
        .unwrap_or(0);
    Ok(TodayMinutes {
        challenge_id,
        date,
        minutes,
    })
}

/// Activity entries of a challenge, oldest first.
#[derive(Debug, Serialize)]
pub struct ActivityList {
    pub challenge_id: i64,
    pub entries: Vec<ActivityLog>,
}

impl Output for ActivityList {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return format!("No activity for challenge #{}.", self.challenge_id);
        }
        self.entries
            .iter()
            .map(|e| format!("{}  {}", e.timestamp.format("%Y-%m-%d %H:%M:%S"), e.activity_type))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn activity_log(storage: &Storage, challenge_id: i64) -> Result<ActivityList> {
    if !storage.challenge_exists(challenge_id)? {
        return Err(Error::NotFound(format!("Challenge not found: {}", challenge_id)));
    }
    Ok(ActivityList {
        challenge_id,
        entries: storage.list_activity(challenge_id)?,
    })
}
