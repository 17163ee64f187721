//! catalogctl - Start and watch catalog scrape jobs.
//!
//! Talks to the catalog backend's admin API: starts a scrape job for a
//! source website, polls its status until it finishes, and renders the
//! progress. Also ships an in-memory stub of the admin API for local use.
//!
//! Architecture:
//! - `api` is the HTTP client, behind the `JobApi` trait
//! - `jobs` holds the poller, the presenter and the lifecycle controller
//! - `cli` is a thin layer over both

mod api;
mod cli;
mod config;
mod error;
mod jobs;
mod models;
mod server;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "warn,catalogctl=debug"
    } else {
        "warn,catalogctl=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    execute(cli).await
}
