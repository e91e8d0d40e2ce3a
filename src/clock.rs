//! Time provider.
//!
//! Every state-changing operation captures "now" exactly once from a [`Clock`]
//! and reuses that value for all timestamps it writes. Calendar days (for work
//! sessions and analytics) are taken in the clock's own offset.
//!
//! - [`WorldTimeClock`] asks an external time service (primary endpoint, then a
//!   fallback endpoint) and degrades to the local clock at a fixed offset.
//! - [`OffsetClock`] is the local clock at a fixed offset, with no network.
//! - [`FixedClock`] is a settable clock for tests and replay.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Deserialize;
use std::sync::{Arc, Mutex};

use crate::{Error, Result};

/// Default primary endpoint of the time service.
pub const DEFAULT_PRIMARY_URL: &str = "https://worldtimeapi.org/api/timezone/Africa/Cairo";

/// Default fallback endpoint of the time service.
pub const DEFAULT_FALLBACK_URL: &str = "http://worldtimeapi.org/api/timezone/Africa/Cairo";

/// Offset used when the time service is unreachable (EET, UTC+2).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 2;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// User-Agent sent to the time service
const USER_AGENT: &str = concat!("bounty-tracker/", env!("CARGO_PKG_VERSION"));

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Build a fixed offset from whole hours east of UTC.
pub fn fixed_offset(hours: i32) -> Result<FixedOffset> {
    FixedOffset::east_opt(hours * 3600)
        .ok_or_else(|| Error::Config(format!("UTC offset out of range: {} hours", hours)))
}

/// Local system clock shifted to a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct OffsetClock {
    offset: FixedOffset,
}

impl OffsetClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for OffsetClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Response body of the time service (only the field we use).
#[derive(Debug, Deserialize)]
struct WorldTimeResponse {
    datetime: String,
}

/// Clock backed by an external time service with a local fallback.
pub struct WorldTimeClock {
    agent: ureq::Agent,
    primary_url: String,
    fallback_url: String,
    fallback: OffsetClock,
}

impl WorldTimeClock {
    pub fn new(
        primary_url: impl Into<String>,
        fallback_url: impl Into<String>,
        timeout: std::time::Duration,
        fallback_offset: FixedOffset,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            primary_url: primary_url.into(),
            fallback_url: fallback_url.into(),
            fallback: OffsetClock::new(fallback_offset),
        }
    }

    /// Fetch the current time from one endpoint.
    fn fetch(&self, url: &str) -> Result<DateTime<FixedOffset>> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| Error::ExternalService(format!("{}: {}", url, e)))?;

        let body: WorldTimeResponse = response
            .into_json()
            .map_err(|e| Error::ExternalService(format!("{}: unreadable body: {}", url, e)))?;

        parse_service_datetime(&body.datetime)
    }
}

impl Clock for WorldTimeClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.fetch(&self.primary_url) {
            Ok(now) => return now,
            Err(e) => tracing::warn!("Primary time service failed: {}", e),
        }
        match self.fetch(&self.fallback_url) {
            Ok(now) => return now,
            Err(e) => tracing::warn!("Fallback time service failed: {}", e),
        }
        let now = self.fallback.now();
        tracing::warn!(offset = %now.offset(), "Using local clock for current time");
        now
    }
}

/// Parse the `datetime` field of a time-service response.
///
/// Accepts RFC 3339 with either a numeric offset or a trailing `Z`.
pub fn parse_service_datetime(raw: &str) -> Result<DateTime<FixedOffset>> {
    let normalized = match raw.strip_suffix('Z') {
        Some(stripped) => format!("{}+00:00", stripped),
        None => raw.to_string(),
    };
    DateTime::parse_from_rfc3339(&normalized)
        .map_err(|e| Error::ExternalService(format!("Malformed datetime '{}': {}", raw, e)))
}

/// A clock that returns a settable instant. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
