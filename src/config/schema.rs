//! KDL schema for config.kdl.
//!
//! This module provides:
//! - Rust structs representing the KDL schema
//! - Serialization/deserialization to/from KDL format
//! - Validation and file loading

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Config file name, both in the data directory and the system config directory.
pub const CONFIG_FILE: &str = "config.kdl";

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where "now" comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClockSource {
    /// Query the world time service, falling back to the fixed offset
    #[default]
    WorldTimeApi,
    /// Local system time shifted to the fixed offset; never touches the network
    Local,
}

impl ClockSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "world-time-api" => Some(ClockSource::WorldTimeApi),
            "local" => Some(ClockSource::Local),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClockSource::WorldTimeApi => "world-time-api",
            ClockSource::Local => "local",
        }
    }
}

impl std::fmt::Display for ClockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User preferences stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// server {
///     host "127.0.0.1"
///     port 5000
/// }
/// clock {
///     source "world-time-api"  // or "local"
///     utc-offset-hours 2
///     timeout-secs 10
///     primary-url "https://worldtimeapi.org/api/timezone/Africa/Cairo"
///     fallback-url "http://worldtimeapi.org/api/timezone/Africa/Cairo"
/// }
/// output-format "human"  // or "json"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub clock_source: Option<ClockSource>,
    /// Offset used for the local clock and the network fallback
    pub utc_offset_hours: Option<i32>,
    pub timeout_secs: Option<u64>,
    pub primary_url: Option<String>,
    pub fallback_url: Option<String>,
    pub output_format: Option<OutputFormat>,
}

fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(str::to_string)
}

fn first_integer(node: &KdlNode) -> Option<i128> {
    node.entries().first().and_then(|e| e.value().as_integer())
}

fn string_node(name: &str, value: &str) -> KdlNode {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(KdlValue::String(value.to_string())));
    node
}

fn integer_node(name: &str, value: i128) -> KdlNode {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(KdlValue::Integer(value)));
    node
}

impl TrackerConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.server_port == Some(0) {
            return Err("server port must be 1-65535, got 0".to_string());
        }
        if let Some(hours) = self.utc_offset_hours {
            if !(-23..=23).contains(&hours) {
                return Err(format!("utc-offset-hours must be -23..23, got {}", hours));
            }
        }
        if self.timeout_secs == Some(0) {
            return Err("timeout-secs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    ///
    /// Unknown nodes are ignored. Values of the wrong type or out of range
    /// are dropped so the next layer can supply them.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        if let Some(server) = doc.get("server").and_then(|n| n.children()) {
            if let Some(node) = server.get("host") {
                config.server_host = first_string(node);
            }
            if let Some(node) = server.get("port") {
                config.server_port = first_integer(node).and_then(|p| u16::try_from(p).ok());
            }
        }

        if let Some(clock) = doc.get("clock").and_then(|n| n.children()) {
            if let Some(node) = clock.get("source") {
                config.clock_source = first_string(node).and_then(|s| ClockSource::parse(&s));
            }
            if let Some(node) = clock.get("utc-offset-hours") {
                config.utc_offset_hours = first_integer(node).and_then(|h| i32::try_from(h).ok());
            }
            if let Some(node) = clock.get("timeout-secs") {
                config.timeout_secs = first_integer(node).and_then(|t| u64::try_from(t).ok());
            }
            if let Some(node) = clock.get("primary-url") {
                config.primary_url = first_string(node);
            }
            if let Some(node) = clock.get("fallback-url") {
                config.fallback_url = first_string(node);
            }
        }

        if let Some(node) = doc.get("output-format") {
            config.output_format = first_string(node).and_then(|s| OutputFormat::parse(&s));
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        let mut server = KdlDocument::new();
        if let Some(ref host) = self.server_host {
            server.nodes_mut().push(string_node("host", host));
        }
        if let Some(port) = self.server_port {
            server.nodes_mut().push(integer_node("port", port as i128));
        }
        if !server.nodes().is_empty() {
            let mut node = KdlNode::new("server");
            node.set_children(server);
            doc.nodes_mut().push(node);
        }

        let mut clock = KdlDocument::new();
        if let Some(source) = self.clock_source {
            clock.nodes_mut().push(string_node("source", source.as_str()));
        }
        if let Some(hours) = self.utc_offset_hours {
            clock.nodes_mut().push(integer_node("utc-offset-hours", hours as i128));
        }
        if let Some(secs) = self.timeout_secs {
            clock.nodes_mut().push(integer_node("timeout-secs", secs as i128));
        }
        if let Some(ref url) = self.primary_url {
            clock.nodes_mut().push(string_node("primary-url", url));
        }
        if let Some(ref url) = self.fallback_url {
            clock.nodes_mut().push(string_node("fallback-url", url));
        }
        if !clock.nodes().is_empty() {
            let mut node = KdlNode::new("clock");
            node.set_children(clock);
            doc.nodes_mut().push(node);
        }

        if let Some(format) = self.output_format {
            doc.nodes_mut().push(string_node("output-format", format.as_str()));
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &TrackerConfig) {
        if other.server_host.is_some() {
            self.server_host = other.server_host.clone();
        }
        if other.server_port.is_some() {
            self.server_port = other.server_port;
        }
        if other.clock_source.is_some() {
            self.clock_source = other.clock_source;
        }
        if other.utc_offset_hours.is_some() {
            self.utc_offset_hours = other.utc_offset_hours;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.primary_url.is_some() {
            self.primary_url = other.primary_url.clone();
        }
        if other.fallback_url.is_some() {
            self.fallback_url = other.fallback_url.clone();
        }
        if other.output_format.is_some() {
            self.output_format = other.output_format;
        }
    }

    /// Load a config file. A missing file yields an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let doc: KdlDocument = raw
            .parse()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_kdl(&doc);
        config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }
}
