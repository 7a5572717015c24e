mod commands;
mod config;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{add_rls::AddRlsArgs, apply::ApplyArgs};
use crate::config::AppConfig;

/// rlskit - PostgreSQL row-level security policy tooling
#[derive(Parser)]
#[command(name = "rlskit", version, about)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a migration that enables RLS on a table
    AddRls(AddRlsArgs),
    /// Execute a SQL script against the database
    Apply(ApplyArgs),
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref())?;

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command {
        Some(Commands::AddRls(args)) => commands::add_rls::run(&config, args),
        Some(Commands::Apply(args)) => commands::apply::run(&config, args).await,
        Some(Commands::Check) => commands::check::run(&config),
        None => {
            anyhow::bail!("no command given; see `rlskit --help`")
        }
    }
}
