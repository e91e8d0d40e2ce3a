//! Bounty Tracker CLI.

use bounty_tracker::cli::{
    ActivityCommands, ChallengeCommands, Cli, Commands, ConfigCommands, VulnCommands,
};
use bounty_tracker::commands::{self, Output, parse_bounty_lenient, parse_optional_f64};
use bounty_tracker::config::{self, ConfigOverrides, OutputFormat, ResolvedConfig};
use bounty_tracker::models::{NewVulnerability, Severity, VulnerabilityUpdate};
use bounty_tracker::storage::{self, Storage};
use bounty_tracker::{Error, Result, server};
use clap::Parser;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

const LOG_FORMAT_ENV: &str = "BT_LOG_FORMAT";

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let mut human = cli.human_readable;
    let result = storage::get_data_dir(cli.data_dir.as_deref()).and_then(|data_dir| {
        let mut overrides = ConfigOverrides::new().with_offline(cli.offline);
        if cli.human_readable {
            overrides = overrides.with_output_format(OutputFormat::Human);
        }
        if let Commands::Serve { ref host, port } = cli.command {
            overrides = overrides.with_server(host.clone(), port);
        }
        let resolved = config::resolve_config(&data_dir, &overrides)?;
        human = resolved.output_format() == OutputFormat::Human;
        run_command(cli.command, &data_dir, &overrides, &resolved, human)
    });

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Log to stderr so stdout stays machine-readable.
///
/// `RUST_LOG` overrides the filter; `BT_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bounty_tracker=info,tower_http=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

fn parse_severity(raw: &str) -> Result<Severity> {
    raw.parse().map_err(Error::Validation)
}

fn run_command(
    command: Commands,
    data_dir: &Path,
    overrides: &ConfigOverrides,
    resolved: &ResolvedConfig,
    human: bool,
) -> Result<()> {
    match command {
        Commands::Challenge { command } => {
            let mut storage = Storage::open_with_data_dir(data_dir)?;
            match command {
                ChallengeCommands::Create {
                    days,
                    target_money,
                    target_vulns,
                } => {
                    let clock = resolved.build_clock()?;
                    let result = commands::challenge_create(
                        &mut storage,
                        clock.as_ref(),
                        days,
                        target_money,
                        target_vulns,
                    )?;
                    output(&result, human);
                }
                ChallengeCommands::List => {
                    output(&commands::challenge_list(&storage)?, human);
                }
                ChallengeCommands::Active => {
                    output(&commands::challenge_active(&storage)?, human);
                }
                ChallengeCommands::Show { id } => {
                    let clock = resolved.build_clock()?;
                    output(&commands::challenge_show(&storage, clock.as_ref(), id)?, human);
                }
                ChallengeCommands::Progress { id } => {
                    let clock = resolved.build_clock()?;
                    output(
                        &commands::challenge_progress(&storage, clock.as_ref(), id)?,
                        human,
                    );
                }
                ChallengeCommands::Delete { id } => {
                    output(&commands::challenge_delete(&mut storage, id)?, human);
                }
            }
        }

        Commands::Vuln { command } => {
            let mut storage = Storage::open_with_data_dir(data_dir)?;
            match command {
                VulnCommands::Add {
                    challenge_id,
                    title,
                    severity,
                    company,
                    bounty,
                    description,
                } => {
                    let new = NewVulnerability {
                        challenge_id,
                        title,
                        severity: Some(parse_severity(&severity)?),
                        company,
                        bounty: Some(parse_bounty_lenient(bounty.as_deref())),
                        description,
                    };
                    let clock = resolved.build_clock()?;
                    output(&commands::vuln_add(&mut storage, clock.as_ref(), new)?, human);
                }
                VulnCommands::Edit {
                    id,
                    title,
                    severity,
                    company,
                    bounty,
                    description,
                } => {
                    let update = VulnerabilityUpdate {
                        title,
                        severity: severity.as_deref().map(parse_severity).transpose()?,
                        company,
                        bounty: parse_optional_f64("bounty", bounty.as_deref())?,
                        description,
                    };
                    if update.is_empty() {
                        return Err(Error::Validation(
                            "Nothing to change; pass at least one field".to_string(),
                        ));
                    }
                    let clock = resolved.build_clock()?;
                    output(
                        &commands::vuln_edit(&mut storage, clock.as_ref(), id, update)?,
                        human,
                    );
                }
                VulnCommands::Rm { id } => {
                    output(&commands::vuln_delete(&mut storage, id)?, human);
                }
                VulnCommands::List { challenge_id } => {
                    output(&commands::vuln_list(&storage, challenge_id)?, human);
                }
            }
        }

        Commands::Heartbeat { challenge_id } => {
            let mut storage = Storage::open_with_data_dir(data_dir)?;
            let clock = resolved.build_clock()?;
            output(
                &commands::heartbeat(&mut storage, clock.as_ref(), Some(challenge_id))?,
                human,
            );
        }

        Commands::Today { challenge_id } => {
            let storage = Storage::open_with_data_dir(data_dir)?;
            let clock = resolved.build_clock()?;
            output(
                &commands::today_minutes(&storage, clock.as_ref(), challenge_id)?,
                human,
            );
        }

        Commands::Analytics { challenge_id } => {
            let storage = Storage::open_with_data_dir(data_dir)?;
            match challenge_id {
                Some(id) => output(&commands::analytics_for(&storage, id)?, human),
                None => output(&commands::analytics_overview(&storage)?, human),
            }
        }

        Commands::Activity {
            command: ActivityCommands::Log { challenge_id },
        } => {
            let storage = Storage::open_with_data_dir(data_dir)?;
            output(&commands::activity_log(&storage, challenge_id)?, human);
        }

        Commands::Config {
            command: ConfigCommands::Show,
        } => {
            output(&config::config_show(data_dir, overrides)?, human);
        }

        Commands::Serve { .. } => {
            let storage = Storage::open_with_data_dir(data_dir)?;
            let clock = resolved.build_clock()?;
            let host = resolved.host.value.clone();
            let port = resolved.port.value;

            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| Error::Other(format!("Failed to create runtime: {}", e)))?
                .block_on(server::start_server(storage, clock, &host, port))?;
        }
    }

    Ok(())
}
