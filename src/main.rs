//! fcrun CLI entry point.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

/// fcrun - launch and control Firecracker-style microVMs
#[derive(Parser, Debug)]
#[command(name = "fcrun")]
#[command(about = "Launch and control Firecracker-style microVMs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch a microVM from a configuration file and supervise it.
    Launch(cli::launch::LaunchCmd),

    /// Validate a configuration file without launching anything.
    Check(cli::check::CheckCmd),
}

fn main() {
    let cli = Cli::parse();

    init_logging();

    tracing::debug!(version = fcrun::VERSION, "starting fcrun");

    let result = match cli.command {
        Commands::Launch(cmd) => cmd.run(),
        Commands::Check(cmd) => cmd.run(),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fcrun=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
