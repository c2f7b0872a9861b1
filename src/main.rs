use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod build;
mod cli;
mod config;
mod error;
mod target;
mod transport;
mod upload;

#[cfg(test)]
mod test_support;

use target::Target;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the config file (defaults to ./assetpub.toml, then the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a signed service-account assertion and print it (diagnostic)
    Assertion,
    /// Exchange a signed assertion for an access token and print it (diagnostic)
    Token,
    /// Build all targets and upload the artifacts to the bucket
    Publish {
        /// Only build and upload these targets (defaults to [build] targets)
        #[arg(long = "target", value_enum, ignore_case = true)]
        targets: Vec<Target>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for all commands
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let settings =
        config::Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match &cli.command {
        Commands::Assertion => cli::assertion_command(&settings)?,
        Commands::Token => cli::token_command(&settings).await?,
        Commands::Publish { targets } => cli::publish_command(&settings, targets).await?,
    }

    Ok(())
}
