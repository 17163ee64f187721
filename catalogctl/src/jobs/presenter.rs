//! Display projections of a job snapshot.
//!
//! Everything here is a pure function of the snapshot: no clock, no I/O.

use chrono::Duration;

use crate::models::{Job, JobStatus};

/// Short label for a status.
pub const fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "Pending",
        JobStatus::Running => "Running",
        JobStatus::Completed => "Completed",
        JobStatus::Failed => "Failed",
        JobStatus::Cancelled => "Cancelled",
    }
}

/// Longer description of what the job is doing.
pub const fn stage_label(status: JobStatus, total: u64) -> &'static str {
    match status {
        JobStatus::Pending => "Waiting to start",
        JobStatus::Running if total == 0 => "Discovering catalog",
        JobStatus::Running => "Scraping products",
        JobStatus::Completed => "Scrape finished",
        JobStatus::Failed => "Scrape failed",
        JobStatus::Cancelled => "Scrape cancelled",
    }
}

/// Per-job counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobCounters {
    pub new: u64,
    pub updated: u64,
    pub obsolete: u64,
    pub errors: u64,
}

/// Everything a progress display needs from one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    pub job_id: String,
    pub source_name: String,
    pub status: JobStatus,
    pub status_label: &'static str,
    pub stage_label: &'static str,
    /// Taken verbatim from the snapshot.
    pub progress_percent: u8,
    pub processed: u64,
    pub total: u64,
    pub counters: JobCounters,
    /// Only present while the job is running.
    pub current_item: Option<String>,
    pub error_message: Option<String>,
    /// Run time, once the job has both started and finished.
    pub duration: Option<Duration>,
}

impl JobView {
    pub fn from_job(job: &Job) -> Self {
        let current_item = (job.status == JobStatus::Running
            && !job.current_item_label.is_empty())
        .then(|| job.current_item_label.clone());

        let duration = match (job.started_at, job.finished_at) {
            (Some(started), Some(finished)) if finished >= started => Some(finished - started),
            _ => None,
        };

        Self {
            job_id: job.job_id.clone(),
            source_name: job.source_name.clone(),
            status: job.status,
            status_label: status_label(job.status),
            stage_label: stage_label(job.status, job.total),
            progress_percent: job.progress_percent,
            processed: job.processed,
            total: job.total,
            counters: JobCounters {
                new: job.new_count,
                updated: job.updated_count,
                obsolete: job.obsolete_count,
                errors: job.error_count,
            },
            current_item,
            error_message: job.error_message.clone(),
            duration,
        }
    }

    /// `processed/total`.
    pub fn counts_line(&self) -> String {
        format!("{}/{}", self.processed, self.total)
    }

    /// `"10%, 5/50"`.
    pub fn progress_line(&self) -> String {
        format!("{}%, {}", self.progress_percent, self.counts_line())
    }

    /// `"new 12 · updated 3 · obsolete 0 · errors 1"`.
    pub fn counters_line(&self) -> String {
        format!(
            "new {} · updated {} · obsolete {} · errors {}",
            self.counters.new, self.counters.updated, self.counters.obsolete, self.counters.errors
        )
    }
}

/// Format a duration as `1h02m03s`, `2m05s` or `7s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes:02}m{seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
