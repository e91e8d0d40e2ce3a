//! Analytics views.

use serde::Serialize;

use super::{Output, json_string};
use crate::analytics::AnalyticsReport;
use crate::models::{Challenge, Severity, Vulnerability, WorkSession};
use crate::storage::Storage;
use crate::{Error, Result};

impl Output for AnalyticsReport {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let s = &self.summary;
        let severities: Vec<String> = Severity::ALL
            .iter()
            .map(|sev| {
                let count = self.severity_counts.get(*sev);
                format!("{} {}", count, sev.as_str().to_lowercase())
            })
            .collect();
        let mut lines = vec![
            format!(
                "Worked {:.2} hours over {} day(s), {:.2} per day (longest streak {} days)",
                s.total_hours,
                self.daily_work.len(),
                s.avg_hours_per_day,
                s.longest_streak_days
            ),
            format!(
                "Earned ${:.2} from {} finding(s), ${:.2}/hour",
                s.total_earnings, s.total_vulnerabilities, s.hourly_rate
            ),
            format!(
                "Severity: {} ({:.0}% critical)",
                severities.join(", "),
                s.critical_percentage
            ),
        ];
        for (day, hours) in &self.daily_work {
            let earned = self.daily_earnings.get(day).copied().unwrap_or(0.0);
            lines.push(format!("  {}  {:>5.2}h  ${:.2}", day, hours, earned));
        }
        lines.join("\n")
    }
}

/// Chart data for a single challenge.
pub fn analytics_for(storage: &Storage, challenge_id: i64) -> Result<AnalyticsReport> {
    if !storage.challenge_exists(challenge_id)? {
        return Err(Error::NotFound(format!("Challenge not found: {}", challenge_id)));
    }
    let sessions = storage.list_sessions(Some(challenge_id))?;
    let vulns = storage.list_vulnerabilities(Some(challenge_id))?;
    Ok(AnalyticsReport::build(&sessions, &vulns))
}

/// Every challenge, session and finding, for the analytics page.
#[derive(Debug, Serialize)]
pub struct AnalyticsOverview {
    pub challenges: Vec<Challenge>,
    pub work_sessions: Vec<WorkSession>,
    pub vulnerabilities: Vec<Vulnerability>,
}

impl Output for AnalyticsOverview {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let minutes: i64 = self.work_sessions.iter().map(|s| s.minutes).sum();
        let earned: f64 = self.vulnerabilities.iter().map(|v| v.bounty).sum();
        format!(
            "{} challenge(s), {:.1} hours worked, {} finding(s), ${:.2} earned",
            self.challenges.len(),
            minutes as f64 / 60.0,
            self.vulnerabilities.len(),
            earned
        )
    }
}

pub fn analytics_overview(storage: &Storage) -> Result<AnalyticsOverview> {
    Ok(AnalyticsOverview {
        challenges: storage.list_challenges()?,
        work_sessions: storage.list_sessions(None)?,
        vulnerabilities: storage.list_vulnerabilities(None)?,
    })
}
