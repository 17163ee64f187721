//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// catalogctl - Start and watch catalog scrape jobs
#[derive(Parser, Debug)]
#[command(name = "catalogctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Admin API base URL (default http://localhost:8000/api/v1/admin)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Admin API key sent as X-Admin-API-Key
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Config file (default ~/.catalogctl/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a scrape job for a source website and watch it
    Scrape {
        /// Source website ID
        source_id: i64,

        /// Print the job ID and exit instead of watching
        #[arg(long)]
        detach: bool,
    },

    /// Show the current state of a scrape job
    Status {
        /// Job ID
        job_id: String,
    },

    /// Cancel a running scrape job
    Cancel {
        /// Job ID
        job_id: String,
    },

    /// List scrape jobs known to the backend
    Jobs,

    /// List source websites
    Sources,

    /// Run an in-memory stub of the admin API for local testing
    ServeStub {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Items each job processes
        #[arg(long, default_value = "50")]
        items: u64,

        /// Milliseconds spent per item
        #[arg(long, default_value = "200")]
        step_ms: u64,

        /// Source ID whose jobs fail half-way
        #[arg(long)]
        fail_source: Option<i64>,
    },
}
