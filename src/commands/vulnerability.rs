//! Vulnerability ledger commands.

use serde::Serialize;

use super::{Output, json_string, normalize_text};
use crate::clock::Clock;
use crate::models::{NewVulnerability, Vulnerability, VulnerabilityUpdate};
use crate::storage::Storage;
use crate::{Error, Result};

impl Output for Vulnerability {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "#{} [{}] {} (${:.2})",
            self.id, self.severity, self.title, self.bounty
        )];
        if let Some(ref company) = self.company {
            lines.push(format!("  Company: {}", company));
        }
        if let Some(ref description) = self.description {
            lines.push(format!("  {}", description));
        }
        lines.push(format!(
            "  Logged {} against challenge #{}",
            self.created_at.format("%Y-%m-%d %H:%M"),
            self.challenge_id
        ));
        lines.join("\n")
    }
}

/// Log a new vulnerability against an existing challenge.
///
/// A missing or non-finite bounty is recorded as 0. Negative bounties are kept.
pub fn vuln_add(
    storage: &mut Storage,
    clock: &dyn Clock,
    new: NewVulnerability,
) -> Result<Vulnerability> {
    let title = new.title.trim().to_string();
    if title.is_empty() {
        return Err(Error::Validation("Title is required".to_string()));
    }
    let severity = new
        .severity
        .ok_or_else(|| Error::Validation("Severity is required".to_string()))?;
    if !storage.challenge_exists(new.challenge_id)? {
        return Err(Error::Validation(format!(
            "Challenge {} does not exist",
            new.challenge_id
        )));
    }

    let now = clock.now();
    let vuln = Vulnerability {
        id: 0,
        challenge_id: new.challenge_id,
        title,
        severity,
        company: normalize_text(new.company),
        bounty: new.bounty.filter(|b| b.is_finite()).unwrap_or(0.0),
        description: normalize_text(new.description),
        created_at: now,
        updated_at: now,
    };
    let vuln = storage.add_vulnerability(&vuln)?;
    tracing::info!(
        vulnerability_id = vuln.id,
        challenge_id = vuln.challenge_id,
        severity = %vuln.severity,
        "Vulnerability logged"
    );
    Ok(vuln)
}

/// Overwrite only the supplied fields of a vulnerability.
pub fn vuln_edit(
    storage: &mut Storage,
    clock: &dyn Clock,
    id: i64,
    mut update: VulnerabilityUpdate,
) -> Result<Vulnerability> {
    let mut vuln = storage.get_vulnerability(id)?;

    if let Some(ref title) = update.title {
        let trimmed = title.trim().to_string();
        if trimmed.is_empty() {
            return Err(Error::Validation("Title must not be empty".to_string()));
        }
        update.title = Some(trimmed);
    }
    update.company = update.company.map(|c| c.trim().to_string());
    update.description = update.description.map(|d| d.trim().to_string());
    if let Some(bounty) = update.bounty {
        if !bounty.is_finite() {
            return Err(Error::Validation(format!(
                "Bounty must be a finite number, got {}",
                bounty
            )));
        }
    }

    update.apply_to(&mut vuln, clock.now());
    storage.update_vulnerability(&vuln)?;
    tracing::info!(vulnerability_id = id, "Vulnerability updated");
    Ok(vuln)
}

/// Result of deleting a vulnerability.
#[derive(Debug, Serialize)]
pub struct VulnerabilityDeleted {
    pub id: i64,
    /// Owning challenge, for navigating back to its page
    pub challenge_id: i64,
}

impl Output for VulnerabilityDeleted {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Deleted vulnerability #{} from challenge #{}",
            self.id, self.challenge_id
        )
    }
}

/// Delete a vulnerability. Fails with `NotFound` when it does not exist.
pub fn vuln_delete(storage: &mut Storage, id: i64) -> Result<VulnerabilityDeleted> {
    let challenge_id = storage.delete_vulnerability(id)?;
    tracing::info!(vulnerability_id = id, challenge_id, "Vulnerability deleted");
    Ok(VulnerabilityDeleted { id, challenge_id })
}

/// Findings of one challenge, newest first, with their bounty total.
#[derive(Debug, Serialize)]
pub struct VulnerabilityList {
    pub challenge_id: i64,
    pub vulnerabilities: Vec<Vulnerability>,
    pub total_bounty: f64,
}

impl Output for VulnerabilityList {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.vulnerabilities.is_empty() {
            return format!("No vulnerabilities logged for challenge #{}.", self.challenge_id);
        }
        let mut lines = vec![format!(
            "{} vulnerability(ies), ${:.2} total:",
            self.vulnerabilities.len(),
            self.total_bounty
        )];
        for vuln in &self.vulnerabilities {
            lines.push(format!(
                "  #{} [{}] {} (${:.2})",
                vuln.id, vuln.severity, vuln.title, vuln.bounty
            ));
        }
        lines.join("\n")
    }
}

pub fn vuln_list(storage: &Storage, challenge_id: i64) -> Result<VulnerabilityList> {
    if !storage.challenge_exists(challenge_id)? {
        return Err(Error::NotFound(format!("Challenge not found: {}", challenge_id)));
    }
    Ok(VulnerabilityList {
        challenge_id,
        vulnerabilities: storage.list_vulnerabilities(Some(challenge_id))?,
        total_bounty: storage.total_bounty(challenge_id)?,
    })
}

/// Sum of bounties for a challenge, 0 when it has none.
pub fn total_bounty(storage: &Storage, challenge_id: i64) -> Result<f64> {
    storage.total_bounty(challenge_id)
}
