//! Fixed-interval status polling for a single scrape job.
//!
//! The poller runs as a spawned task. Each tick issues exactly one status
//! fetch, and the next tick is only awaited once that fetch has settled, so
//! at most one request is ever in flight and snapshots arrive in order.
//! Failed fetches are reported and retried on the next tick without backoff.
//! A terminal snapshot ends the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::api::JobApi;
use crate::error::{ApiError, JobError};
use crate::models::Job;

/// Interval the admin dashboard polls at.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between two fetches.
    pub interval: Duration,
    /// A fetch taking longer than this counts as a failed poll.
    pub fetch_timeout: Duration,
}

impl PollerConfig {
    /// Poll at `interval`, abandoning fetches that take longer than one interval.
    pub const fn every(interval: Duration) -> Self {
        Self {
            interval,
            fetch_timeout: interval,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::every(DEFAULT_POLL_INTERVAL)
    }
}

/// Something the poller observed.
#[derive(Debug)]
pub enum PollEvent {
    /// A non-terminal snapshot.
    Snapshot(Job),
    /// One fetch failed; polling continues.
    Transient(JobError),
    /// The terminal snapshot. Sent exactly once, after which the loop ends.
    Finished(Job),
}

/// Handle to a running polling loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct JobPoller {
    job_id: String,
    handle: JoinHandle<()>,
}

impl JobPoller {
    /// Start polling `job_id`, delivering every observation to `on_event`.
    ///
    /// The first fetch happens one interval after spawning. Must be called
    /// from within a Tokio runtime.
    pub fn spawn<A, F>(api: Arc<A>, job_id: impl Into<String>, config: PollerConfig, on_event: F) -> Self
    where
        A: JobApi,
        F: FnMut(PollEvent) + Send + 'static,
    {
        let job_id = job_id.into();
        let handle = tokio::spawn(run(api, job_id.clone(), config, on_event));
        Self { job_id, handle }
    }

    #[cfg(test)]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Whether the loop has ended (terminal snapshot or stopped).
    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Halt the loop. No fetch is issued after this returns; a fetch that
    /// is currently in flight is abandoned.
    pub fn stop(&self) {
        if !self.handle.is_finished() {
            debug!(job_id = %self.job_id, "stopping poller");
        }
        self.handle.abort();
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run<A, F>(api: Arc<A>, job_id: String, config: PollerConfig, mut on_event: F)
where
    A: JobApi,
    F: FnMut(PollEvent) + Send + 'static,
{
    let mut ticker = time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let fetched = match time::timeout(config.fetch_timeout, api.fetch_job(&job_id)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(config.fetch_timeout)),
        };

        match fetched {
            Ok(job) if job.is_terminal() => {
                debug!(job_id = %job_id, status = %job.status, "job reached terminal status");
                on_event(PollEvent::Finished(job));
                return;
            }
            Ok(job) => {
                debug!(
                    job_id = %job_id,
                    status = %job.status,
                    processed = job.processed,
                    total = job.total,
                    "job snapshot"
                );
                on_event(PollEvent::Snapshot(job));
            }
            Err(source) => {
                warn!(job_id = %job_id, error = %source, "status poll failed, retrying on next tick");
                on_event(PollEvent::Transient(JobError::PollTransient {
                    job_id: job_id.clone(),
                    source,
                }));
            }
        }
    }
}
