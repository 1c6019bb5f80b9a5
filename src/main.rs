//! Activity Harness - Main Entry Point

use activity_harness::cli::{execute, Cli};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "activity_harness=info".into()),
        )
        .init();

    execute(Cli::parse())
}
