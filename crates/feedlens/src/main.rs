//! feedlens - Feed insight CLI
//!
//! Scans feed snapshots for posts, attaches insight triggers, runs analyses
//! against the generation service and shows the results.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;
mod error;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("feedlens=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load()?;

    // Execute command
    match cli.command {
        Commands::Credentials(cmd) => commands::credentials::execute(cmd, &config).await,
        Commands::Scan(cmd) => commands::scan::execute(cmd, &config).await,
        Commands::Watch(cmd) => commands::watch::execute(cmd, &config).await,
        Commands::Analyze(cmd) => commands::analyze::execute(cmd, &config).await,
        Commands::Insights(cmd) => commands::insights::execute(cmd, &config).await,
        Commands::Copy { index } => commands::copy::execute(index, &config).await,
        Commands::Status { json } => commands::status::execute(json, &config).await,
        Commands::Version => {
            println!("feedlens {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
