mod cli;
mod commands;
mod observability;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use fhir_kindling::config::loader::load_config;

use cli::{Cli, Commands, ConfigCommands};
use output::print_error;

fn main() {
    // Load .env file if present; not an error if it doesn't exist
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    if let Err(e) = run() {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let level = cli.log_level.as_deref().unwrap_or(&cfg.logging.level);
    observability::init_tracing_with_level(level);

    if let Some(server) = &cli.server {
        cfg.server.api_url = Some(server.clone());
    }
    let output = cli.output.unwrap_or_default();

    match &cli.command {
        Commands::Query(args) => commands::query::query(&cfg, args, output)?,
        Commands::Generate(args) => commands::generate::generate(args, output)?,
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => commands::config::show(&cfg),
        },
    }

    Ok(())
}
