//! Data models exchanged with the catalog backend.

mod job;
mod source;

use serde::{Deserialize, Serialize};

pub use job::{Job, JobStatus};
pub use source::{SourceWebsite, SourceWebsiteList};

/// Response of `POST /source-websites/{id}/scrape-job`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartJobResponse {
    /// Either "Scrape job started" or "Job already running".
    #[serde(default)]
    pub message: Option<String>,
    pub job: Job,
}

impl StartJobResponse {
    /// Message the backend uses when it hands back an existing job.
    pub const ALREADY_RUNNING: &'static str = "Job already running";

    /// Whether the backend re-attached us to a job that was already running.
    pub fn already_running(&self) -> bool {
        self.message.as_deref() == Some(Self::ALREADY_RUNNING)
    }
}

/// Response of `GET /scrape-jobs/{job_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job: Job,
}

/// Response of `GET /scrape-jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobList {
    pub jobs: Vec<Job>,
}
