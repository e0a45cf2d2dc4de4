//! autojournal CLI binary entry point.
//!
//! Initializes the tracing subscriber, parses command-line arguments with
//! clap, and dispatches to the selected subcommand via [`Cli::run`].

mod cli;
mod logging;
mod prompt;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Extract the home directory and log slug before consuming cli.
    let (home, slug) = cli.log_context();

    // Clean old logs (best-effort, before tracing is initialized).
    logging::cleanup_old_logs(&home);

    // Initialize tracing with optional file layer.
    let _guard = logging::init_tracing(&home, slug.as_deref())?;

    cli.run().await
}
