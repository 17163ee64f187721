//! CLI command execution.
//!
//! Thin client: every command is one or more calls to the admin API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::api::{AdminClient, JobApi};
use crate::config::Config;
use crate::error::JobError;
use crate::jobs::{format_duration, outcome, ControllerState, JobController, JobView};
use crate::models::Job;
use crate::server::{self, StubConfig};

use super::args::{Cli, Commands};

/// How long Ctrl-C waits for the server-side cancel before exiting.
const CANCEL_GRACE: Duration = Duration::from_secs(3);

pub async fn execute(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Scrape { source_id, detach } => {
            if detach {
                start_detached(&config, source_id).await
            } else {
                watch_scrape(&config, source_id).await
            }
        }
        Commands::Status { job_id } => show_status(&config, &job_id).await,
        Commands::Cancel { job_id } => cancel_job(&config, &job_id).await,
        Commands::Jobs => list_jobs(&config).await,
        Commands::Sources => list_sources(&config).await,
        Commands::ServeStub {
            port,
            items,
            step_ms,
            fail_source,
        } => {
            let stub = StubConfig {
                api_key: (!config.api_key.is_empty()).then(|| config.api_key.clone()),
                items_per_job: items,
                step: Duration::from_millis(step_ms),
                fail_source,
            };
            server::serve(port, stub).await
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(url) = &cli.api_url {
        config.api_url.clone_from(url);
    }
    if let Some(key) = &cli.api_key {
        config.api_key.clone_from(key);
    }
    config.validate()?;
    debug!(api_url = %config.api_url, "configuration resolved");
    Ok(config)
}

fn connect(config: &Config) -> Result<Arc<AdminClient>> {
    let client = AdminClient::new(config.client_options()).context("Failed to build HTTP client")?;
    Ok(Arc::new(client))
}

async fn start_detached(config: &Config, source_id: i64) -> Result<()> {
    let client = connect(config)?;
    let started = client
        .start_job(source_id)
        .await
        .map_err(JobError::StartFailed)?;

    if started.already_running() {
        println!("Job already running for {}", started.job.source_name);
    } else {
        println!("Started job for {}", started.job.source_name);
    }
    println!("Job ID: {}", started.job.job_id);
    Ok(())
}

async fn watch_scrape(config: &Config, source_id: i64) -> Result<()> {
    let client = connect(config)?;
    let terminal = Arc::new(Notify::new());
    let refresh = refresh_on_terminal(Arc::clone(&client), source_id, Arc::clone(&terminal));
    let controller = JobController::new(Arc::clone(&client), config.poller_config())
        .on_terminal(move |_| terminal.notify_one());

    let job = controller.start(source_id).await?;
    println!("Watching job {} ({})", job.job_id, job.source_name);
    println!("Press Ctrl-C to cancel.\n");

    let mut updates = WatchStream::new(controller.subscribe());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut last_line = String::new();
    let finished = loop {
        tokio::select! {
            update = updates.next() => {
                let Some(state) = update else {
                    bail!("Job tracking stopped unexpectedly");
                };
                match state {
                    ControllerState::Tracking { job, poll_failures, .. } => {
                        let line = progress_line(&JobView::from_job(&job), poll_failures);
                        if line != last_line {
                            println!("{line}");
                            last_line = line;
                        }
                    }
                    ControllerState::Terminal { job } => break job,
                    ControllerState::Idle | ControllerState::Starting { .. } => {}
                }
            }
            _ = &mut ctrl_c => {
                eprintln!("\nCancelling job {}...", job.job_id);
                break cancel_tracked(&controller).await?;
            }
        }
    };

    print_summary(&finished);
    match refresh.await {
        Ok(Some(line)) => println!("{line}"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "source refresh task failed"),
    }

    outcome(finished)?;
    Ok(())
}

/// Cancel locally and give the server-side request a moment to go out.
async fn cancel_tracked(controller: &JobController<AdminClient>) -> Result<Job> {
    match controller.cancel() {
        Ok(cancellation) => {
            if tokio::time::timeout(CANCEL_GRACE, cancellation.request)
                .await
                .is_err()
            {
                warn!("cancel request still pending, exiting anyway");
            }
            Ok(cancellation.job)
        }
        // The job finished while the signal was being handled.
        Err(JobError::NotTracking) => match controller.state() {
            ControllerState::Terminal { job } => Ok(job),
            _ => controller
                .wait_for_terminal()
                .await
                .context("No scrape job to cancel"),
        },
        Err(e) => Err(e.into()),
    }
}

fn progress_line(view: &JobView, poll_failures: u32) -> String {
    let mut line = format!(
        "[{}] {} - {}",
        view.status_label,
        view.progress_line(),
        view.stage_label
    );
    if let Some(item) = &view.current_item {
        line.push_str(&format!(" - {item}"));
    }
    if poll_failures > 0 {
        line.push_str(&format!(" (status unavailable, {poll_failures} failed polls)"));
    }
    line
}

fn print_summary(job: &Job) {
    let view = JobView::from_job(job);
    println!();
    println!("Job {} {}", view.job_id, view.status_label.to_lowercase());
    println!("  Processed: {}", view.counts_line());
    println!("  {}", view.counters_line());
    if let Some(duration) = view.duration {
        println!("  Duration: {}", format_duration(duration));
    }
    if let Some(message) = &view.error_message {
        println!("  Error: {message}");
    }
}

/// Product counts change once a job ends. Waits for the controller's
/// terminal notification, then fetches the fresh figure.
fn refresh_on_terminal(
    client: Arc<AdminClient>,
    source_id: i64,
    terminal: Arc<Notify>,
) -> JoinHandle<Option<String>> {
    tokio::spawn(async move {
        terminal.notified().await;
        source_count_line(&client, source_id).await
    })
}

async fn source_count_line(client: &AdminClient, source_id: i64) -> Option<String> {
    match client.list_sources().await {
        Ok(sources) => sources.iter().find(|s| s.id == source_id).map(|source| {
            format!(
                "{} now has {} products",
                source.display_name, source.product_count
            )
        }),
        Err(e) => {
            warn!(error = %e, "failed to refresh source list");
            None
        }
    }
}

async fn show_status(config: &Config, job_id: &str) -> Result<()> {
    let client = connect(config)?;
    let job = client
        .fetch_job(job_id)
        .await
        .with_context(|| format!("Failed to fetch job {job_id}"))?;
    let view = JobView::from_job(&job);

    println!("Job:      {}", view.job_id);
    println!("Source:   {}", view.source_name);
    println!("Status:   {} ({})", view.status_label, view.stage_label);
    println!("Progress: {}", view.progress_line());
    println!("Counters: {}", view.counters_line());
    if let Some(item) = &view.current_item {
        println!("Current:  {item}");
    }
    if let Some(duration) = view.duration {
        println!("Duration: {}", format_duration(duration));
    }
    if let Some(message) = &view.error_message {
        println!("Error:    {message}");
    }
    Ok(())
}

async fn cancel_job(config: &Config, job_id: &str) -> Result<()> {
    let client = connect(config)?;
    client
        .cancel_job(job_id)
        .await
        .with_context(|| format!("Failed to cancel job {job_id}"))?;
    println!("Cancelled job {job_id}");
    Ok(())
}

async fn list_jobs(config: &Config) -> Result<()> {
    let client = connect(config)?;
    let jobs = client.list_jobs().await.context("Failed to list jobs")?;

    if jobs.is_empty() {
        println!("No scrape jobs found.");
        return Ok(());
    }

    println!(
        "{:<10} {:<18} {:<10} {:<14} {:<6} {:<8}",
        "ID", "SOURCE", "STATUS", "PROGRESS", "NEW", "UPDATED"
    );
    println!("{}", "-".repeat(70));

    for job in jobs {
        let view = JobView::from_job(&job);
        println!(
            "{:<10} {:<18} {:<10} {:<14} {:<6} {:<8}",
            view.job_id,
            truncate(&view.source_name, 16),
            view.status_label,
            view.progress_line(),
            view.counters.new,
            view.counters.updated,
        );
    }
    Ok(())
}

async fn list_sources(config: &Config) -> Result<()> {
    let client = connect(config)?;
    let sources = client
        .list_sources()
        .await
        .context("Failed to list source websites")?;

    if sources.is_empty() {
        println!("No source websites found.");
        return Ok(());
    }

    println!(
        "{:<4} {:<18} {:<24} {:<8} {:<8}",
        "ID", "NAME", "DISPLAY NAME", "ACTIVE", "PRODUCTS"
    );
    println!("{}", "-".repeat(66));

    for source in sources {
        println!(
            "{:<4} {:<18} {:<24} {:<8} {:<8}",
            source.id,
            truncate(&source.name, 16),
            truncate(&source.display_name, 22),
            if source.is_active { "yes" } else { "no" },
            source.product_count,
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
