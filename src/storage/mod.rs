//! Storage layer for tracker data.
//!
//! All records live in a single SQLite database (`tracker.db`) under the data
//! directory:
//!
//! - `challenges` - at most one row has `is_active = 1` (partial unique index)
//! - `vulnerabilities`, `work_sessions`, `activity_logs` - owned by a challenge,
//!   removed by `ON DELETE CASCADE`
//!
//! `work_sessions` is unique per `(challenge_id, date)`. Heartbeats are applied
//! as one upsert inside an IMMEDIATE transaction, so heartbeats from several
//! connections (CLI and server sharing a database) queue on the write lock
//! instead of failing with `SQLITE_BUSY`.

use crate::models::{ActivityLog, Challenge, Severity, Vulnerability, WorkSession};
use crate::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "BT_DATA_DIR";

/// Database file name inside the data directory.
pub const DB_FILE: &str = "tracker.db";

const DATE_FORMAT: &str = "%Y-%m-%d";

const CHALLENGE_COLUMNS: &str =
    "id, days, target_money, target_vulns, start_time, end_time, created_at, is_active";

const VULNERABILITY_COLUMNS: &str =
    "id, challenge_id, title, severity, company, bounty, description, created_at, updated_at";

const SESSION_COLUMNS: &str =
    "id, challenge_id, date, minutes, last_activity, created_at, updated_at";

/// Rows removed alongside a deleted challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeCounts {
    pub vulnerabilities: usize,
    pub work_sessions: usize,
    pub activity_logs: usize,
}

/// Storage manager backed by one SQLite database.
pub struct Storage {
    /// Data directory holding the database
    pub root: PathBuf,
    conn: Connection,
}

impl Storage {
    /// Open (creating if needed) the store in `data_dir`.
    pub fn open_with_data_dir(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;

        let conn = Connection::open(data_dir.join(DB_FILE))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            root: data_dir.to_path_buf(),
            conn,
        })
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS challenges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                days INTEGER NOT NULL CHECK (days > 0),
                target_money REAL,
                target_vulns INTEGER,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                created_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_challenges_single_active
                ON challenges(is_active) WHERE is_active = 1;

            CREATE TABLE IF NOT EXISTS vulnerabilities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                challenge_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                severity TEXT NOT NULL,
                company TEXT,
                bounty REAL NOT NULL DEFAULT 0,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (challenge_id) REFERENCES challenges(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_vulnerabilities_challenge
                ON vulnerabilities(challenge_id);

            CREATE TABLE IF NOT EXISTS work_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                challenge_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                minutes INTEGER NOT NULL DEFAULT 0,
                last_activity TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CONSTRAINT unique_challenge_date UNIQUE (challenge_id, date),
                FOREIGN KEY (challenge_id) REFERENCES challenges(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS activity_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                challenge_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                activity_type TEXT NOT NULL DEFAULT 'work_session',
                extra_data TEXT,
                FOREIGN KEY (challenge_id) REFERENCES challenges(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_activity_logs_challenge
                ON activity_logs(challenge_id);
            "#,
        )?;

        Ok(())
    }

    // === Challenge Operations ===

    /// Insert a challenge as the only active one. Returns it with its assigned id.
    pub fn create_challenge(&mut self, challenge: &Challenge) -> Result<Challenge> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute("UPDATE challenges SET is_active = 0 WHERE is_active = 1", [])?;
        tx.execute(
            r#"
            INSERT INTO challenges
            (days, target_money, target_vulns, start_time, end_time, created_at, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
            "#,
            params![
                challenge.days,
                challenge.target_money,
                challenge.target_vulns,
                challenge.start_time.to_rfc3339(),
                challenge.end_time.to_rfc3339(),
                challenge.created_at.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Challenge {
            id,
            is_active: true,
            ..challenge.clone()
        })
    }

    /// Get a challenge by ID.
    pub fn get_challenge(&self, id: i64) -> Result<Challenge> {
        let sql = format!("SELECT {} FROM challenges WHERE id = ?1", CHALLENGE_COLUMNS);
        self.conn
            .query_row(&sql, [id], challenge_from_row)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Challenge not found: {}", id)))
    }

    /// Whether a challenge with this ID exists.
    pub fn challenge_exists(&self, id: i64) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM challenges WHERE id = ?1)",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// The currently active challenge, if any.
    pub fn get_active_challenge(&self) -> Result<Option<Challenge>> {
        let sql = format!(
            "SELECT {} FROM challenges WHERE is_active = 1",
            CHALLENGE_COLUMNS
        );
        Ok(self.conn.query_row(&sql, [], challenge_from_row).optional()?)
    }

    /// All challenges, newest first.
    pub fn list_challenges(&self) -> Result<Vec<Challenge>> {
        let sql = format!("SELECT {} FROM challenges ORDER BY id DESC", CHALLENGE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let challenges = stmt
            .query_map([], challenge_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(challenges)
    }

    /// Delete a challenge and everything it owns in one transaction.
    pub fn delete_challenge(&mut self, id: i64) -> Result<CascadeCounts> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let count = |table: &str| -> rusqlite::Result<usize> {
            tx.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE challenge_id = ?1", table),
                [id],
                |row| row.get(0),
            )
        };
        let counts = CascadeCounts {
            vulnerabilities: count("vulnerabilities")?,
            work_sessions: count("work_sessions")?,
            activity_logs: count("activity_logs")?,
        };

        let deleted = tx.execute("DELETE FROM challenges WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Challenge not found: {}", id)));
        }
        tx.commit()?;

        Ok(counts)
    }

    // === Vulnerability Operations ===

    /// Insert a vulnerability. Returns it with its assigned id.
    pub fn add_vulnerability(&mut self, vuln: &Vulnerability) -> Result<Vulnerability> {
        self.conn.execute(
            r#"
            INSERT INTO vulnerabilities
            (challenge_id, title, severity, company, bounty, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                vuln.challenge_id,
                vuln.title,
                vuln.severity.as_str(),
                vuln.company,
                vuln.bounty,
                vuln.description,
                vuln.created_at.to_rfc3339(),
                vuln.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(Vulnerability {
            id: self.conn.last_insert_rowid(),
            ..vuln.clone()
        })
    }

    /// Get a vulnerability by ID.
    pub fn get_vulnerability(&self, id: i64) -> Result<Vulnerability> {
        let sql = format!(
            "SELECT {} FROM vulnerabilities WHERE id = ?1",
            VULNERABILITY_COLUMNS
        );
        self.conn
            .query_row(&sql, [id], vulnerability_from_row)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Vulnerability not found: {}", id)))
    }

    /// Overwrite the mutable fields of an existing vulnerability.
    pub fn update_vulnerability(&mut self, vuln: &Vulnerability) -> Result<()> {
        let updated = self.conn.execute(
            r#"
            UPDATE vulnerabilities
            SET title = ?2, severity = ?3, company = ?4, bounty = ?5,
                description = ?6, updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                vuln.id,
                vuln.title,
                vuln.severity.as_str(),
                vuln.company,
                vuln.bounty,
                vuln.description,
                vuln.updated_at.to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            return Err(Error::NotFound(format!("Vulnerability not found: {}", vuln.id)));
        }
        Ok(())
    }

    /// Delete a vulnerability. Returns the owning challenge ID.
    pub fn delete_vulnerability(&mut self, id: i64) -> Result<i64> {
        let challenge_id = self
            .conn
            .query_row(
                "DELETE FROM vulnerabilities WHERE id = ?1 RETURNING challenge_id",
                [id],
                |row| row.get(0),
            )
            .optional()?;

        challenge_id.ok_or_else(|| Error::NotFound(format!("Vulnerability not found: {}", id)))
    }

    /// Vulnerabilities, newest first, optionally for one challenge.
    pub fn list_vulnerabilities(&self, challenge_id: Option<i64>) -> Result<Vec<Vulnerability>> {
        let mut sql = format!("SELECT {} FROM vulnerabilities", VULNERABILITY_COLUMNS);
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(id) = challenge_id {
            sql.push_str(" WHERE challenge_id = ?");
            params_vec.push(Box::new(id));
        }
        sql.push_str(" ORDER BY id DESC");

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let vulns = stmt
            .query_map(params_refs.as_slice(), vulnerability_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(vulns)
    }

    /// Sum of bounties for a challenge (0 when it has none).
    pub fn total_bounty(&self, challenge_id: i64) -> Result<f64> {
        let total = self.conn.query_row(
            "SELECT COALESCE(SUM(bounty), 0.0) FROM vulnerabilities WHERE challenge_id = ?1",
            [challenge_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    // === Work Session Operations ===

    /// Add `minutes` to the session for `(challenge_id, now's date)`, creating it
    /// if needed, and append a matching activity log row.
    ///
    /// Both writes happen in one IMMEDIATE transaction and the increment is a
    /// single `INSERT .. ON CONFLICT DO UPDATE`. Other connections wait on the
    /// busy timeout, so concurrent heartbeats are additive.
    pub fn record_heartbeat(
        &mut self,
        challenge_id: i64,
        now: DateTime<FixedOffset>,
        minutes: i64,
        activity_type: &str,
    ) -> Result<WorkSession> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM challenges WHERE id = ?1)",
            [challenge_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::NotFound(format!("Challenge not found: {}", challenge_id)));
        }

        let ts = now.to_rfc3339();
        let date = now.date_naive().format(DATE_FORMAT).to_string();
        let sql = format!(
            r#"
            INSERT INTO work_sessions
            (challenge_id, date, minutes, last_activity, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4, ?4)
            ON CONFLICT(challenge_id, date) DO UPDATE SET
                minutes = minutes + excluded.minutes,
                last_activity = excluded.last_activity,
                updated_at = excluded.updated_at
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );
        let session = tx.query_row(
            &sql,
            params![challenge_id, date, minutes, ts],
            session_from_row,
        )?;

        tx.execute(
            "INSERT INTO activity_logs (challenge_id, timestamp, activity_type)
             VALUES (?1, ?2, ?3)",
            params![challenge_id, ts, activity_type],
        )?;

        tx.commit()?;
        Ok(session)
    }

    /// The session for a challenge on a given day, if one exists.
    pub fn get_session(&self, challenge_id: i64, date: NaiveDate) -> Result<Option<WorkSession>> {
        let sql = format!(
            "SELECT {} FROM work_sessions WHERE challenge_id = ?1 AND date = ?2",
            SESSION_COLUMNS
        );
        let session = self
            .conn
            .query_row(
                &sql,
                params![challenge_id, date.format(DATE_FORMAT).to_string()],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    /// Work sessions ordered by day, optionally for one challenge.
    pub fn list_sessions(&self, challenge_id: Option<i64>) -> Result<Vec<WorkSession>> {
        let mut sql = format!("SELECT {} FROM work_sessions", SESSION_COLUMNS);
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(id) = challenge_id {
            sql.push_str(" WHERE challenge_id = ?");
            params_vec.push(Box::new(id));
        }
        sql.push_str(" ORDER BY date ASC, challenge_id ASC");

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(params_refs.as_slice(), session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    // === Activity Log Operations ===

    /// Activity log entries for a challenge, oldest first.
    pub fn list_activity(&self, challenge_id: i64) -> Result<Vec<ActivityLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, challenge_id, timestamp, activity_type, extra_data
             FROM activity_logs WHERE challenge_id = ?1 ORDER BY id ASC",
        )?;
        let logs = stmt
            .query_map([challenge_id], activity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<FixedOffset>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw).map_err(|e| conversion_error(idx, e))
}

fn challenge_from_row(row: &Row<'_>) -> rusqlite::Result<Challenge> {
    Ok(Challenge {
        id: row.get(0)?,
        days: row.get(1)?,
        target_money: row.get(2)?,
        target_vulns: row.get(3)?,
        start_time: timestamp_at(row, 4)?,
        end_time: timestamp_at(row, 5)?,
        created_at: timestamp_at(row, 6)?,
        is_active: row.get(7)?,
    })
}

fn vulnerability_from_row(row: &Row<'_>) -> rusqlite::Result<Vulnerability> {
    let severity: String = row.get(3)?;
    Ok(Vulnerability {
        id: row.get(0)?,
        challenge_id: row.get(1)?,
        title: row.get(2)?,
        severity: severity
            .parse::<Severity>()
            .map_err(|e| conversion_error(3, e))?,
        company: row.get(4)?,
        bounty: row.get(5)?,
        description: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
        updated_at: timestamp_at(row, 8)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<WorkSession> {
    let date: String = row.get(2)?;
    Ok(WorkSession {
        id: row.get(0)?,
        challenge_id: row.get(1)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| conversion_error(2, e))?,
        minutes: row.get(3)?,
        last_activity: timestamp_at(row, 4)?,
        created_at: timestamp_at(row, 5)?,
        updated_at: timestamp_at(row, 6)?,
    })
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityLog> {
    let extra: Option<String> = row.get(4)?;
    Ok(ActivityLog {
        id: row.get(0)?,
        challenge_id: row.get(1)?,
        timestamp: timestamp_at(row, 2)?,
        activity_type: row.get(3)?,
        extra_data: extra
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| conversion_error(4, e))?,
    })
}

/// Resolve the data directory.
///
/// Priority: explicit path > `BT_DATA_DIR` > `<XDG data dir>/bounty-tracker`.
pub fn get_data_dir(explicit_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit_dir {
        return Ok(dir.to_path_buf());
    }

    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("bounty-tracker"))
}
