//! platfs entry point.
//!
//! ```bash
//! platfs --platform ios --prefix tns cat src/app.component.ts
//! RUST_LOG=platfs_kernel=debug platfs explain src/app.component.ts
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use platfs_cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs to stderr, filtered by RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("platfs_cli=info".parse()?))
        .init();

    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("Failed to read current directory")?;

    let mut stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    platfs_cli::run(cli, &cwd, &mut stdin, &mut stdout).await
}
