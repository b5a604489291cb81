//! Pathwatch CLI - pathwatch command

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use cli_lib::{logging, PathwatchConfig, Probe};

mod cmd;

/// Pathwatch - follow paths that may not exist yet
#[derive(Parser)]
#[command(name = "pathwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: ~/.config/pathwatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print change events for a path as JSON lines
    Watch {
        /// Path to follow; missing components are waited for
        path: PathBuf,

        /// Extra events to register, e.g. delete,attrib
        #[arg(long, value_delimiter = ',')]
        events: Vec<String>,
    },
    /// Print the state of each path whenever it changes
    Monitor {
        /// Paths to monitor
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// What to read from each path (default: from config)
        #[arg(long, value_enum)]
        probe: Option<Probe>,

        /// Polling period in milliseconds (default: from config)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Re-read on a timer instead of on change events
        #[arg(long)]
        poll: bool,

        /// Stop after this many reads
        #[arg(long, requires = "poll")]
        count: Option<u64>,
    },
    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show the config file path
    Path {
        /// Write the example config there if missing
        #[arg(long)]
        create: bool,
    },
    /// Print an example config file
    Example,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Config(_) => PathwatchConfig::default(),
        _ => PathwatchConfig::load(cli.config.as_deref())?,
    };
    let _log_guard = logging::init(&config.log, cli.verbose)?;

    match cli.command {
        Commands::Watch { path, events } => cmd::watch::run(path, events, &config),
        Commands::Monitor { paths, probe, interval_ms, poll, count } => {
            let args = cmd::monitor::MonitorArgs { paths, probe, interval_ms, poll, count };
            cmd::monitor::run(args, &config)
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => cmd::config::run_show(cli.config.as_deref()),
            ConfigCommands::Path { create } => cmd::config::run_path(cli.config.as_deref(), create),
            ConfigCommands::Example => cmd::config::run_example(),
        },
    }
}
