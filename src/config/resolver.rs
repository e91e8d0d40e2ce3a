//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`BT_HOST`, `BT_PORT`, `BT_OFFLINE`, `BT_UTC_OFFSET_HOURS`)
//! 3. Data-dir config.kdl (`<data-dir>/config.kdl`)
//! 4. System config.kdl (`~/.config/bounty-tracker/config.kdl`)
//! 5. Built-in defaults

use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::{
    self, Clock, DEFAULT_FALLBACK_URL, DEFAULT_PRIMARY_URL, DEFAULT_TIMEOUT_SECS,
    DEFAULT_UTC_OFFSET_HOURS, OffsetClock, WorldTimeClock,
};
use crate::commands::{Output, json_string};
use crate::config::{CONFIG_FILE, ClockSource, OutputFormat, TrackerConfig};
use crate::{Error, Result};

pub const HOST_ENV: &str = "BT_HOST";
pub const PORT_ENV: &str = "BT_PORT";
/// Any value other than "", "0", "false", "no" or "off" forces the local clock.
pub const OFFLINE_ENV: &str = "BT_OFFLINE";
pub const UTC_OFFSET_ENV: &str = "BT_UTC_OFFSET_HOURS";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from environment variable
    EnvVar(String),
    /// Value from the data directory's config.kdl
    DataDir,
    /// Value from the user's config directory
    System,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::DataDir => write!(f, "data-dir"),
            ValueSource::System => write!(f, "system"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub output_format: Option<OutputFormat>,
    /// `--offline` was passed
    pub offline: bool,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn with_server(mut self, host: Option<String>, port: Option<u16>) -> Self {
        self.host = host;
        self.port = port;
        self
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub host: Resolved<String>,
    pub port: Resolved<u16>,
    pub output_format: Resolved<OutputFormat>,
    pub clock_source: Resolved<ClockSource>,
    pub utc_offset_hours: Resolved<i32>,
    pub timeout_secs: Resolved<u64>,
    pub primary_url: Resolved<String>,
    pub fallback_url: Resolved<String>,
}

impl ResolvedConfig {
    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }

    /// Build the clock described by this configuration.
    pub fn build_clock(&self) -> Result<Arc<dyn Clock>> {
        let offset = clock::fixed_offset(self.utc_offset_hours.value)?;
        Ok(match self.clock_source.value {
            ClockSource::Local => Arc::new(OffsetClock::new(offset)),
            ClockSource::WorldTimeApi => Arc::new(WorldTimeClock::new(
                self.primary_url.value.clone(),
                self.fallback_url.value.clone(),
                std::time::Duration::from_secs(self.timeout_secs.value),
                offset,
            )),
        })
    }
}

/// Pick the highest-precedence value among the layers.
fn pick<T: Clone>(
    cli: Option<T>,
    env: Option<(T, &str)>,
    data_dir: Option<&T>,
    system: Option<&T>,
    default: T,
) -> Resolved<T> {
    if let Some(value) = cli {
        Resolved::new(value, ValueSource::CliFlag)
    } else if let Some((value, name)) = env {
        Resolved::new(value, ValueSource::EnvVar(name.to_string()))
    } else if let Some(value) = data_dir {
        Resolved::new(value.clone(), ValueSource::DataDir)
    } else if let Some(value) = system {
        Resolved::new(value.clone(), ValueSource::System)
    } else {
        Resolved::new(default, ValueSource::Default)
    }
}

fn env_parsed<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<(T, &'static str)>> {
    match env(name).filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(|v| Some((v, name)))
            .map_err(|_| Error::Config(format!("{} has an invalid value: '{}'", name, raw))),
    }
}

/// Whether an environment flag value means "on".
pub fn is_truthy(raw: &str) -> bool {
    !matches!(
        raw.trim().to_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

/// Resolve configuration from already-loaded layers.
///
/// `env` looks up an environment variable; tests pass a closure over a map.
pub fn resolve_layers(
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
    data_dir: &TrackerConfig,
    system: &TrackerConfig,
) -> Result<ResolvedConfig> {
    let host = pick(
        overrides.host.clone(),
        env(HOST_ENV)
            .filter(|h| !h.trim().is_empty())
            .map(|h| (h, HOST_ENV)),
        data_dir.server_host.as_ref(),
        system.server_host.as_ref(),
        DEFAULT_HOST.to_string(),
    );
    let port = pick(
        overrides.port,
        env_parsed::<u16>(&env, PORT_ENV)?,
        data_dir.server_port.as_ref(),
        system.server_port.as_ref(),
        DEFAULT_PORT,
    );
    let output_format = pick(
        overrides.output_format,
        None,
        data_dir.output_format.as_ref(),
        system.output_format.as_ref(),
        OutputFormat::Json,
    );

    let offline_env = env(OFFLINE_ENV).filter(|v| is_truthy(v));
    let clock_source = pick(
        overrides.offline.then_some(ClockSource::Local),
        offline_env.map(|_| (ClockSource::Local, OFFLINE_ENV)),
        data_dir.clock_source.as_ref(),
        system.clock_source.as_ref(),
        ClockSource::WorldTimeApi,
    );
    let utc_offset_hours = pick(
        None,
        env_parsed::<i32>(&env, UTC_OFFSET_ENV)?,
        data_dir.utc_offset_hours.as_ref(),
        system.utc_offset_hours.as_ref(),
        DEFAULT_UTC_OFFSET_HOURS,
    );
    // Reject bad offsets here rather than at first use of the clock
    clock::fixed_offset(utc_offset_hours.value)?;

    let timeout_secs = pick(
        None,
        None,
        data_dir.timeout_secs.as_ref(),
        system.timeout_secs.as_ref(),
        DEFAULT_TIMEOUT_SECS,
    );
    let primary_url = pick(
        None,
        None,
        data_dir.primary_url.as_ref(),
        system.primary_url.as_ref(),
        DEFAULT_PRIMARY_URL.to_string(),
    );
    let fallback_url = pick(
        None,
        None,
        data_dir.fallback_url.as_ref(),
        system.fallback_url.as_ref(),
        DEFAULT_FALLBACK_URL.to_string(),
    );

    Ok(ResolvedConfig {
        host,
        port,
        output_format,
        clock_source,
        utc_offset_hours,
        timeout_secs,
        primary_url,
        fallback_url,
    })
}

/// Path of the system-wide config file, if a config directory exists.
pub fn system_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bounty-tracker").join(CONFIG_FILE))
}

/// Resolve configuration for a data directory, reading both config files
/// and the process environment.
pub fn resolve_config(data_dir: &Path, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let system = match system_config_path() {
        Some(path) => TrackerConfig::load(&path)?,
        None => TrackerConfig::new(),
    };
    let local = TrackerConfig::load(&data_dir.join(CONFIG_FILE))?;
    resolve_layers(overrides, |name| std::env::var(name).ok(), &local, &system)
}

/// Output of `bt config show`: resolved values plus build information.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub data_dir: PathBuf,
    pub config: ResolvedConfig,
}

impl Output for ConfigReport {
    fn to_json(&self) -> String {
        json_string(&json!({
            "data_dir": self.data_dir,
            "config": self.config,
            "version": env!("CARGO_PKG_VERSION"),
            "git_commit": crate::GIT_COMMIT,
            "build_timestamp": crate::BUILD_TIMESTAMP,
        }))
    }

    fn to_human(&self) -> String {
        let c = &self.config;
        let mut lines = vec![
            format!(
                "bt {} ({}, built {})",
                env!("CARGO_PKG_VERSION"),
                crate::GIT_COMMIT,
                crate::BUILD_TIMESTAMP
            ),
            format!("data-dir          {}", self.data_dir.display()),
        ];
        let rows = [
            ("server.host", c.host.value.clone(), &c.host.source),
            ("server.port", c.port.value.to_string(), &c.port.source),
            ("output-format", c.output_format.value.to_string(), &c.output_format.source),
            ("clock.source", c.clock_source.value.to_string(), &c.clock_source.source),
            (
                "clock.utc-offset",
                c.utc_offset_hours.value.to_string(),
                &c.utc_offset_hours.source,
            ),
            ("clock.timeout", c.timeout_secs.value.to_string(), &c.timeout_secs.source),
            ("clock.primary", c.primary_url.value.clone(), &c.primary_url.source),
            ("clock.fallback", c.fallback_url.value.clone(), &c.fallback_url.source),
        ];
        for (key, value, source) in rows {
            lines.push(format!("{:<17} {} ({})", key, value, source));
        }
        lines.join("\n")
    }
}

pub fn config_show(data_dir: &Path, overrides: &ConfigOverrides) -> Result<ConfigReport> {
    Ok(ConfigReport {
        data_dir: data_dir.to_path_buf(),
        config: resolve_config(data_dir, overrides)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn no_env() -> impl Fn(&str) -> Option<String> {
        env_of(&[])
    }

    #[test]
    fn test_value_source_display() {
        assert_eq!(ValueSource::CliFlag.to_string(), "cli");
        assert_eq!(ValueSource::EnvVar("BT_PORT".to_string()).to_string(), "env:BT_PORT");
        assert_eq!(ValueSource::DataDir.to_string(), "data-dir");
        assert_eq!(ValueSource::System.to_string(), "system");
        assert_eq!(ValueSource::Default.to_string(), "default");
    }

    #[test]
    fn test_resolve_defaults() {
        let config = resolve_layers(
            &ConfigOverrides::default(),
            no_env(),
            &TrackerConfig::default(),
            &TrackerConfig::default(),
        )
        .unwrap();

        assert_eq!(config.host.value, "127.0.0.1");
        assert_eq!(config.port.value, 5000);
        assert_eq!(config.port.source, ValueSource::Default);
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.clock_source.value, ClockSource::WorldTimeApi);
        assert_eq!(config.utc_offset_hours.value, 2);
        assert_eq!(config.timeout_secs.value, 10);
        assert_eq!(config.primary_url.value, DEFAULT_PRIMARY_URL);
    }

    #[test]
    fn test_resolve_precedence_chain() {
        let system = TrackerConfig {
            server_port: Some(6000),
            server_host: Some("10.0.0.1".to_string()),
            output_format: Some(OutputFormat::Human),
            ..Default::default()
        };
        let data_dir = TrackerConfig {
            server_port: Some(7000),
            ..Default::default()
        };

        let config =
            resolve_layers(&ConfigOverrides::default(), no_env(), &data_dir, &system).unwrap();
        assert_eq!(config.port.value, 7000);
        assert_eq!(config.port.source, ValueSource::DataDir);
        assert_eq!(config.host.value, "10.0.0.1");
        assert_eq!(config.host.source, ValueSource::System);
        assert_eq!(config.output_format.source, ValueSource::System);

        let config = resolve_layers(
            &ConfigOverrides::default(),
            env_of(&[("BT_PORT", "8000")]),
            &data_dir,
            &system,
        )
        .unwrap();
        assert_eq!(config.port.value, 8000);
        assert_eq!(config.port.source, ValueSource::EnvVar("BT_PORT".to_string()));

        let overrides = ConfigOverrides::new().with_server(None, Some(9000));
        let config =
            resolve_layers(&overrides, env_of(&[("BT_PORT", "8000")]), &data_dir, &system)
                .unwrap();
        assert_eq!(config.port.value, 9000);
        assert_eq!(config.port.source, ValueSource::CliFlag);
    }

    #[test]
    fn test_resolve_rejects_bad_env() {
        let result = resolve_layers(
            &ConfigOverrides::default(),
            env_of(&[("BT_PORT", "http")]),
            &TrackerConfig::default(),
            &TrackerConfig::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));

        let result = resolve_layers(
            &ConfigOverrides::default(),
            env_of(&[("BT_UTC_OFFSET_HOURS", "99")]),
            &TrackerConfig::default(),
            &TrackerConfig::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_offline_forces_local_clock() {
        let data_dir = TrackerConfig {
            clock_source: Some(ClockSource::WorldTimeApi),
            ..Default::default()
        };

        let config = resolve_layers(
            &ConfigOverrides::new().with_offline(true),
            no_env(),
            &data_dir,
            &TrackerConfig::default(),
        )
        .unwrap();
        assert_eq!(config.clock_source.value, ClockSource::Local);
        assert_eq!(config.clock_source.source, ValueSource::CliFlag);

        let config = resolve_layers(
            &ConfigOverrides::default(),
            env_of(&[("BT_OFFLINE", "1")]),
            &data_dir,
            &TrackerConfig::default(),
        )
        .unwrap();
        assert_eq!(config.clock_source.value, ClockSource::Local);

        let config = resolve_layers(
            &ConfigOverrides::default(),
            env_of(&[("BT_OFFLINE", "false")]),
            &data_dir,
            &TrackerConfig::default(),
        )
        .unwrap();
        assert_eq!(config.clock_source.value, ClockSource::WorldTimeApi);
        assert_eq!(config.clock_source.source, ValueSource::DataDir);
    }

    #[test]
    fn test_local_clock_uses_configured_offset() {
        let data_dir = TrackerConfig {
            clock_source: Some(ClockSource::Local),
            utc_offset_hours: Some(-5),
            ..Default::default()
        };
        let config = resolve_layers(
            &ConfigOverrides::default(),
            no_env(),
            &data_dir,
            &TrackerConfig::default(),
        )
        .unwrap();
        let now = config.build_clock().unwrap().now();
        assert_eq!(now.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_is_truthy() {
        for v in ["1", "true", "yes", "on", "TRUE"] {
            assert!(is_truthy(v), "{}", v);
        }
        for v in ["", "0", "false", "No", "off"] {
            assert!(!is_truthy(v), "{}", v);
        }
    }

    #[test]
    fn test_report_json_includes_sources() {
        let config = resolve_layers(
            &ConfigOverrides::new().with_output_format(OutputFormat::Human),
            no_env(),
            &TrackerConfig::default(),
            &TrackerConfig::default(),
        )
        .unwrap();
        let report = ConfigReport {
            data_dir: PathBuf::from("/tmp/bt"),
            config,
        };
        let value: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(value["config"]["port"]["value"], 5000);
        assert_eq!(value["config"]["port"]["source"], "default");
        assert_eq!(value["config"]["output_format"]["value"], "human");
        assert_eq!(value["config"]["output_format"]["source"], "cli");
        assert!(value["version"].is_string());
    }
}
