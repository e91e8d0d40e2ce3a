//! Challenge lifecycle commands.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::{Output, format_challenge_line, json_string};
use crate::clock::Clock;
use crate::models::{Challenge, Vulnerability};
use crate::storage::{CascadeCounts, Storage};
use crate::{Error, Result};

/// Create a challenge starting now. Every other challenge becomes inactive.
pub fn challenge_create(
    storage: &mut Storage,
    clock: &dyn Clock,
    days: i64,
    target_money: Option<f64>,
    target_vulns: Option<i64>,
) -> Result<Challenge> {
    if days <= 0 {
        return Err(Error::Validation(
            "Number of days must be greater than 0".to_string(),
        ));
    }
    if let Some(money) = target_money {
        if !money.is_finite() || money < 0.0 {
            return Err(Error::Validation(format!(
                "target_money must be a non-negative number, got {}",
                money
            )));
        }
    }
    if let Some(vulns) = target_vulns {
        if vulns < 0 {
            return Err(Error::Validation(format!(
                "target_vulns must not be negative, got {}",
                vulns
            )));
        }
    }

    let challenge = Challenge::new(days, target_money, target_vulns, clock.now())?;
    let challenge = storage.create_challenge(&challenge)?;
    tracing::info!(
        challenge_id = challenge.id,
        days = challenge.days,
        "Challenge created"
    );
    Ok(challenge)
}

/// The active challenge, if any.
pub fn challenge_active(storage: &Storage) -> Result<Option<Challenge>> {
    storage.get_active_challenge()
}

/// All challenges plus the active one (home page).
#[derive(Debug, Serialize)]
pub struct ChallengeList {
    pub challenges: Vec<Challenge>,
    pub current_challenge: Option<Challenge>,
}

impl Output for ChallengeList {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.challenges.is_empty() {
            return "No challenges yet. Create one with `bt challenge create <days>`.".to_string();
        }
        let mut lines = vec![format!("{} challenge(s):", self.challenges.len())];
        for challenge in &self.challenges {
            lines.push(format!("  {}", format_challenge_line(challenge)));
        }
        lines.join("\n")
    }
}

pub fn challenge_list(storage: &Storage) -> Result<ChallengeList> {
    Ok(ChallengeList {
        challenges: storage.list_challenges()?,
        current_challenge: storage.get_active_challenge()?,
    })
}

/// Progress of a challenge relative to now and to its targets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengeProgress {
    pub challenge_id: i64,
    /// Whole days since the start, capped at the challenge length
    pub days_elapsed: i64,
    pub days_remaining: i64,
    pub ended: bool,
    pub total_earned: f64,
    pub vulnerability_count: usize,
    pub today_work_minutes: i64,
    /// Fraction of `target_money` reached (absent without a positive target)
    pub money_progress: Option<f64>,
    /// Fraction of `target_vulns` reached (absent without a positive target)
    pub vulns_progress: Option<f64>,
}

impl ChallengeProgress {
    fn compute(
        challenge: &Challenge,
        now: DateTime<FixedOffset>,
        total_earned: f64,
        vulnerability_count: usize,
        today_work_minutes: i64,
    ) -> Self {
        let days_elapsed = (now - challenge.start_time)
            .num_days()
            .clamp(0, challenge.days);
        Self {
            challenge_id: challenge.id,
            days_elapsed,
            days_remaining: challenge.days - days_elapsed,
            ended: now >= challenge.end_time,
            total_earned,
            vulnerability_count,
            today_work_minutes,
            money_progress: challenge
                .target_money
                .filter(|t| *t > 0.0)
                .map(|t| total_earned / t),
            vulns_progress: challenge
                .target_vulns
                .filter(|t| *t > 0)
                .map(|t| vulnerability_count as f64 / t as f64),
        }
    }
}

impl Output for ChallengeProgress {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Challenge #{}: day {} ({} remaining){}",
            self.challenge_id,
            self.days_elapsed,
            self.days_remaining,
            if self.ended { " - ended" } else { "" }
        )];
        lines.push(format!("  Earned: ${:.2}", self.total_earned));
        if let Some(p) = self.money_progress {
            lines.push(format!("  Money target: {:.0}%", p * 100.0));
        }
        lines.push(format!("  Vulnerabilities: {}", self.vulnerability_count));
        if let Some(p) = self.vulns_progress {
            lines.push(format!("  Vulnerability target: {:.0}%", p * 100.0));
        }
        lines.push(format!(
            "  Today: {:.1} hours",
            self.today_work_minutes as f64 / 60.0
        ));
        lines.join("\n")
    }
}

/// Challenge page: the challenge, its findings, earnings and today's work.
#[derive(Debug, Serialize)]
pub struct ChallengeDetail {
    pub challenge: Challenge,
    pub vulnerabilities: Vec<Vulnerability>,
    pub total_earned: f64,
    pub today_work_minutes: i64,
    pub progress: ChallengeProgress,
}

impl Output for ChallengeDetail {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format_challenge_line(&self.challenge)];
        lines.push(format!(
            "Earned ${:.2} from {} finding(s); {:.1} hours today",
            self.total_earned,
            self.vulnerabilities.len(),
            self.today_work_minutes as f64 / 60.0
        ));
        for vuln in &self.vulnerabilities {
            lines.push(format!(
                "  #{} [{}] {} (${:.2})",
                vuln.id, vuln.severity, vuln.title, vuln.bounty
            ));
        }
        lines.join("\n")
    }
}

pub fn challenge_show(storage: &Storage, clock: &dyn Clock, id: i64) -> Result<ChallengeDetail> {
    let challenge = storage.get_challenge(id)?;
    let now = clock.now();

    let vulnerabilities = storage.list_vulnerabilities(Some(id))?;
    let total_earned = storage.total_bounty(id)?;
    let today_work_minutes = storage
        .get_session(id, now.date_naive())?
        .map(|s| s.minutes)
        .unwrap_or(0);
    let progress = ChallengeProgress::compute(
        &challenge,
        now,
        total_earned,
        vulnerabilities.len(),
        today_work_minutes,
    );

    Ok(ChallengeDetail {
        challenge,
        vulnerabilities,
        total_earned,
        today_work_minutes,
        progress,
    })
}

pub fn challenge_progress(
    storage: &Storage,
    clock: &dyn Clock,
    id: i64,
) -> Result<ChallengeProgress> {
    Ok(challenge_show(storage, clock, id)?.progress)
}

/// Result of deleting a challenge.
#[derive(Debug, Serialize)]
pub struct ChallengeDeleted {
    pub id: i64,
    pub removed: CascadeCounts,
}

impl Output for ChallengeDeleted {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Deleted challenge #{} ({} vulnerabilities, {} work sessions, {} activity entries)",
            self.id,
            self.removed.vulnerabilities,
            self.removed.work_sessions,
            self.removed.activity_logs
        )
    }
}

/// Delete a challenge and everything it owns.
pub fn challenge_delete(storage: &mut Storage, id: i64) -> Result<ChallengeDeleted> {
    let removed = storage.delete_challenge(id)?;
    tracing::info!(challenge_id = id, ?removed, "Challenge deleted");
    Ok(ChallengeDeleted { id, removed })
}
