use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use raidengine::persist::OutputFormat;
use raidengine::raid_config::DEFAULT_CONFIG_FILE;

mod cmd;

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "RAIDENGINE_LOG";

#[derive(Parser)]
#[command(name = "raidengine")]
#[command(
    version,
    about = "Run change-tracked, interruption-safe checks against a target service"
)]
pub struct Cli {
    /// Log at debug level unless RAIDENGINE_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to raid.toml
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run tactics against a configured service
    Run {
        /// Service name from raid.toml
        #[arg(short, long)]
        service: String,

        /// Tactic to run (repeatable). Defaults to the service's configured tactics
        #[arg(short, long = "tactic")]
        tactics: Vec<String>,

        /// Allow invasive movements
        #[arg(long)]
        invasive: bool,

        /// Results format: json or yaml
        #[arg(long)]
        output: Option<OutputFormat>,

        /// Directory to write results into
        #[arg(long)]
        write_dir: Option<PathBuf>,
    },
    /// List the tactics of the built-in armory and their strikes
    List,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Pretty-print a results file written by `run`
    Report {
        /// Path to a .json or .yaml results file
        file: PathBuf,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default raid.toml file
    Init,
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "raidengine=debug"
    } else {
        "raidengine=info"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    let (json_layer, text_layer) = if json {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
            None,
        )
    } else {
        (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match &cli.command {
        Commands::Run {
            service,
            tactics,
            invasive,
            output,
            write_dir,
        } => {
            let overrides = cmd::RunOverrides {
                tactics: tactics.clone(),
                invasive: *invasive,
                output: *output,
                write_dir: write_dir.clone(),
            };
            let code = cmd::cmd_run(&cli.config, service, overrides)?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::List => cmd::cmd_list()?,
        Commands::Config { command } => cmd::cmd_config(&cli.config, command.clone())?,
        Commands::Report { file } => cmd::cmd_report(file)?,
    }

    Ok(())
}
