//! Roach CLI - Command-line interface
//!
//! Commands:
//! - serve: Run the arena (matchmaking, sessions, HTTP API)
//! - match: Relay a single game between two engine processes

mod match_cmd;
mod serve;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roach")]
#[command(about = "Ranked Hive engine arena")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run matchmaking and the HTTP API until Ctrl-C
    Serve(serve::ServeArgs),
    /// Play one relayed game between two engines
    Match(match_cmd::MatchArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve::run(args),
        Commands::Match(args) => match_cmd::run(args),
    }
}
