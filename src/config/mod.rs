//! Configuration for the tracker.
//!
//! ## config.kdl - User preferences
//!
//! Located at:
//! - System: `~/.config/bounty-tracker/config.kdl`
//! - Data dir: `<data-dir>/config.kdl`
//!
//! Contains:
//! - `server` block - `host` and `port` for `bt serve`
//! - `clock` block - time source, fallback UTC offset, request timeout and
//!   time-service URLs
//! - `output-format` - "json" or "human"
//!
//! ## Precedence
//!
//! CLI flag > environment variable > data-dir config > system config > defaults
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigOverrides, ConfigReport, HOST_ENV, OFFLINE_ENV, PORT_ENV, Resolved, ResolvedConfig,
    UTC_OFFSET_ENV, ValueSource, config_show, is_truthy, resolve_config, resolve_layers,
    system_config_path,
};
pub use schema::{CONFIG_FILE, ClockSource, OutputFormat, TrackerConfig};
