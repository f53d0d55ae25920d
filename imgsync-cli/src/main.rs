//! imgsync — mirror container images into a private registry.
//!
//! # Usage
//!
//! ```text
//! imgsync run [--config images.json] [--namespace <ns>] [--registry-host <host>]
//!             [--state sync_success.json] [--webhook-url <url>] [--report <path>]
//!             [--container-tool docker] [--command-timeout 900]
//!             [--no-checkpoint] [--fail-on-error]
//! imgsync targets [--config images.json] [--namespace <ns>] [--json]
//! imgsync status [--state sync_success.json] [--json]
//! ```

mod commands;
mod webhook;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{run::RunArgs, status::StatusArgs, targets::TargetsArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "imgsync",
    version,
    about = "Mirror upstream container images into a private registry",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync every configured image tag whose upstream digest changed.
    Run(RunArgs),

    /// Print the destination reference of every configured image tag.
    Targets(TargetsArgs),

    /// Show the recorded digest of every synced image tag.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Targets(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

/// Log lines go to stderr so `--json` output on stdout stays parseable.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
