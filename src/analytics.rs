//! Aggregations over work sessions and vulnerabilities.
//!
//! Everything here is a pure function of the records passed in; callers load
//! the records for one challenge and hand them over.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Severity, Vulnerability, WorkSession};

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Number of findings per severity. Every severity is always present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(rename = "Critical")]
    pub critical: u64,
    #[serde(rename = "High")]
    pub high: u64,
    #[serde(rename = "Medium")]
    pub medium: u64,
    #[serde(rename = "Low")]
    pub low: u64,
}

impl SeverityCounts {
    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    fn increment(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low
    }
}

/// Chart data for one challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    /// Hours worked per day (`YYYY-MM-DD`)
    pub daily_work: BTreeMap<String, f64>,
    pub severity_counts: SeverityCounts,
    /// Bounty earned per day the finding was logged
    pub daily_earnings: BTreeMap<String, f64>,
    pub summary: AnalyticsSummary,
}

impl AnalyticsReport {
    pub fn build(sessions: &[WorkSession], vulns: &[Vulnerability]) -> Self {
        let daily_work = by_day(sessions);
        let severity_counts = severity_counts(vulns);
        let daily_earnings = daily_earnings(vulns);
        let summary = summarize(&daily_work, &severity_counts, &daily_earnings);
        Self {
            daily_work,
            severity_counts,
            daily_earnings,
            summary,
        }
    }
}

/// Headline numbers derived from the daily series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_hours: f64,
    /// Average over days with any recorded work
    pub avg_hours_per_day: f64,
    pub total_earnings: f64,
    /// Earnings per worked hour, 0 when nothing has been worked
    pub hourly_rate: f64,
    pub total_vulnerabilities: u64,
    /// Share of critical findings, in percent
    pub critical_percentage: f64,
    /// Longest run of consecutive worked days
    pub longest_streak_days: u32,
    /// Running total of earnings in date order
    pub cumulative_earnings: Vec<(String, f64)>,
}

/// Hours worked per day. One entry per session (sessions are unique per day).
pub fn by_day(sessions: &[WorkSession]) -> BTreeMap<String, f64> {
    sessions
        .iter()
        .map(|s| (s.date.format(DATE_KEY_FORMAT).to_string(), s.hours()))
        .collect()
}

/// Findings per severity.
pub fn severity_counts(vulns: &[Vulnerability]) -> SeverityCounts {
    let mut counts = SeverityCounts::default();
    for vuln in vulns {
        counts.increment(vuln.severity);
    }
    counts
}

/// Summed bounty per creation day.
pub fn daily_earnings(vulns: &[Vulnerability]) -> BTreeMap<String, f64> {
    let mut earnings = BTreeMap::new();
    for vuln in vulns {
        let day = vuln.created_at.date_naive().format(DATE_KEY_FORMAT).to_string();
        *earnings.entry(day).or_insert(0.0) += vuln.bounty;
    }
    earnings
}

/// Summary numbers for the insights panel.
pub fn summarize(
    daily_work: &BTreeMap<String, f64>,
    severity_counts: &SeverityCounts,
    daily_earnings: &BTreeMap<String, f64>,
) -> AnalyticsSummary {
    let total_hours: f64 = daily_work.values().sum();
    let worked_days = daily_work.len();
    let total_earnings: f64 = daily_earnings.values().sum();
    let total_vulnerabilities = severity_counts.total();

    let mut running = 0.0;
    let cumulative_earnings = daily_earnings
        .iter()
        .map(|(day, amount)| {
            running += amount;
            (day.clone(), running)
        })
        .collect();

    AnalyticsSummary {
        total_hours,
        avg_hours_per_day: if worked_days > 0 {
            total_hours / worked_days as f64
        } else {
            0.0
        },
        total_earnings,
        hourly_rate: if total_hours > 0.0 {
            total_earnings / total_hours
        } else {
            0.0
        },
        total_vulnerabilities,
        critical_percentage: if total_vulnerabilities > 0 {
            severity_counts.critical as f64 * 100.0 / total_vulnerabilities as f64
        } else {
            0.0
        },
        longest_streak_days: longest_streak(daily_work.keys()),
        cumulative_earnings,
    }
}

/// Longest run of consecutive calendar days among `days` (`YYYY-MM-DD`).
///
/// Unparseable keys are skipped.
pub fn longest_streak<'a>(days: impl IntoIterator<Item = &'a String>) -> u32 {
    let mut dates: Vec<NaiveDate> = days
        .into_iter()
        .filter_map(|d| NaiveDate::parse_from_str(d, DATE_KEY_FORMAT).ok())
        .collect();
    dates.sort();
    dates.dedup();

    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<NaiveDate> = None;
    for date in dates {
        current = match previous {
            Some(prev) if prev.succ_opt() == Some(date) => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        previous = Some(date);
    }
    longest
}
