use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use history_trail::cli::{
    handle_config_command, handle_list_command, handle_show_command, open_log, ListArgs, ShowArgs,
};
use history_trail::config::{Settings, TrailPaths};

#[derive(Parser)]
#[command(
    name = "trail",
    author = "Kaylee Beyene",
    version,
    about = "Inspect audit trails recorded by history-trail",
    long_about = "trail lists, filters and reconstructs audit records stored in a \
                  history-trail JSONL audit log."
)]
struct Cli {
    /// Audit log file (defaults to the configured log)
    #[arg(long, global = true, env = "HISTORY_TRAIL_LOG")]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List audit records, newest first
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one audit record and the state it captured
    Show(ShowArgs),

    /// Show current configuration and paths
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = TrailPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;
    let log = open_log(cli.log, &paths, &settings);

    match cli.command {
        Some(Commands::List(args)) => handle_list_command(&log, &settings, &args)?,
        Some(Commands::Show(args)) => handle_show_command(&log, &args)?,
        Some(Commands::Config) => handle_config_command(&paths, &settings, &log),
        None => {
            println!("trail - audit trail inspector");
            println!();
            println!("Run 'trail --help' for usage information.");
        }
    }

    Ok(())
}
