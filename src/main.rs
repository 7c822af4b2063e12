//! Entrain CLI
//!
//! Command-line interface for the entrainment engine.

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use entrain::cli::commands::{self, RenderOptions};
use entrain::cli::{Cli, Commands, SpoolCommands};
use entrain::{EngineConfig, EntrainError};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!("entrain v{}", env!("CARGO_PKG_VERSION"));

    let Some(command) = cli.command else {
        println!("Entrain v{}", env!("CARGO_PKG_VERSION"));
        println!("Use --help for available commands");
        return Ok(());
    };

    let config = commands::load_config(cli.config.as_deref())?;
    if let Err(err) = run(command, config) {
        if let Some(error) = err.downcast_ref::<EntrainError>() {
            for hint in error.recovery_suggestions() {
                eprintln!("  hint: {}", hint);
            }
        }
        return Err(err);
    }
    Ok(())
}

fn run(command: Commands, config: EngineConfig) -> Result<()> {
    match command {
        Commands::Protocols { json } => commands::list_protocols(json),
        Commands::Validate { path } => commands::validate_protocol(&path),
        Commands::Render {
            source,
            output,
            preset,
            noise,
            noise_volume,
            isochronic,
        } => {
            let options = RenderOptions {
                preset,
                noise,
                noise_volume,
                isochronic,
            };
            commands::render(config, &source, &output, &options)
        }
        Commands::Simulate {
            source,
            step,
            store,
        } => commands::simulate(config, &source, step, store.as_deref()),
        Commands::Spool(SpoolCommands::List { spool }) => commands::spool_list(&spool),
        Commands::Spool(SpoolCommands::Retry { spool, store }) => {
            commands::spool_retry(&spool, &store)
        }
        Commands::InitConfig { path } => commands::init_config(&path),
    }
}
