//! Accord CLI - Command-line interface for Accord
//!
//! Usage:
//!   accord demo                   - Run the pairing demo with scripted oracles
//!   accord config [--file <path>] - Print the effective configuration

use clap::{Parser, Subcommand};
use cli::commands::{ConfigCommand, DemoCommand};

#[derive(Parser)]
#[command(name = "accord")]
#[command(about = "Accord - personal-agent pairing orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the end-to-end pairing demo with scripted oracles
    Demo(DemoCommand),
    /// Print the effective configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo(cmd) => cmd.run().await,
        Commands::Config(cmd) => cmd.run(),
    }
}
