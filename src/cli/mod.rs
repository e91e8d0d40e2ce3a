//! CLI argument definitions for the tracker.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bounty Tracker - track time-boxed bug bounty challenges.
///
/// Start with `bt challenge create <days>`, log findings with `bt vuln add`,
/// and record work with `bt heartbeat`.
#[derive(Parser, Debug)]
#[command(name = "bt")]
#[command(
    author,
    version,
    about = "Track bug bounty challenges, findings and work time",
    long_about = None
)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Directory holding tracker.db and config.kdl.
    /// Defaults to the platform data directory (e.g. ~/.local/share/bounty-tracker).
    #[arg(long = "data-dir", global = true, env = "BT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Use the local clock at the configured UTC offset instead of the time service.
    /// Can also be set via BT_OFFLINE.
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Challenge lifecycle commands
    Challenge {
        #[command(subcommand)]
        command: ChallengeCommands,
    },

    /// Vulnerability ledger commands
    #[command(visible_alias = "vulnerability")]
    Vuln {
        #[command(subcommand)]
        command: VulnCommands,
    },

    /// Credit five minutes of work to a challenge for today
    Heartbeat {
        /// Challenge ID
        challenge_id: i64,
    },

    /// Show minutes worked today on a challenge
    Today {
        /// Challenge ID
        challenge_id: i64,
    },

    /// Show charts data and summary numbers for a challenge
    Analytics {
        /// Challenge ID (omit for every challenge, session and finding)
        challenge_id: Option<i64>,
    },

    /// Activity log commands
    Activity {
        #[command(subcommand)]
        command: ActivityCommands,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run the HTTP server
    Serve {
        /// Address to bind (default from config, then 127.0.0.1)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (default from config, then 5000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Challenge subcommands
#[derive(Subcommand, Debug)]
pub enum ChallengeCommands {
    /// Start a new challenge now; it becomes the active one
    #[command(visible_alias = "new")]
    Create {
        /// Length in days
        days: i64,

        /// Earnings goal
        #[arg(long)]
        target_money: Option<f64>,

        /// Number of findings to reach
        #[arg(long)]
        target_vulns: Option<i64>,
    },

    /// List all challenges, newest first
    List,

    /// Show the active challenge
    Active,

    /// Show a challenge with its findings and today's work
    Show {
        /// Challenge ID
        id: i64,
    },

    /// Show elapsed days and progress towards the targets
    Progress {
        /// Challenge ID
        id: i64,
    },

    /// Delete a challenge with all its findings, sessions and activity
    Delete {
        /// Challenge ID
        id: i64,
    },
}

/// Vulnerability subcommands
#[derive(Subcommand, Debug)]
pub enum VulnCommands {
    /// Log a finding against a challenge
    Add {
        /// Challenge ID
        challenge_id: i64,

        /// Short title
        title: String,

        /// Critical, High, Medium or Low
        #[arg(short, long)]
        severity: String,

        /// Program or company the finding was reported to
        #[arg(short, long)]
        company: Option<String>,

        /// Bounty awarded (unparseable values are recorded as 0)
        #[arg(short, long, allow_hyphen_values = true)]
        bounty: Option<String>,

        /// Longer description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Change only the given fields of a finding
    Edit {
        /// Vulnerability ID
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        severity: Option<String>,

        /// New company (empty string clears it)
        #[arg(short, long)]
        company: Option<String>,

        #[arg(short, long, allow_hyphen_values = true)]
        bounty: Option<String>,

        /// New description (empty string clears it)
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a finding
    #[command(visible_alias = "delete")]
    Rm {
        /// Vulnerability ID
        id: i64,
    },

    /// List findings of a challenge with their bounty total
    List {
        /// Challenge ID
        challenge_id: i64,
    },
}

/// Activity subcommands
#[derive(Subcommand, Debug)]
pub enum ActivityCommands {
    /// Show recorded heartbeats of a challenge, oldest first
    Log {
        /// Challenge ID
        challenge_id: i64,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved settings and where each came from
    Show,
}
