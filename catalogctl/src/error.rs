//! Error types for the backend client and the job tracking core.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single request to the catalog backend.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl ApiError {
    /// HTTP status of the response, if the server answered at all.
    #[cfg(test)]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Closed set of failures the job controller reports.
#[derive(Error, Debug)]
pub enum JobError {
    /// The start call failed; nothing is being tracked.
    #[error("failed to start scrape job: {0}")]
    StartFailed(#[source] ApiError),

    /// The backend reported the job as failed.
    #[error("scrape job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// A single status poll failed; polling continues.
    #[error("status poll for job {job_id} failed: {source}")]
    PollTransient {
        job_id: String,
        #[source]
        source: ApiError,
    },

    /// A job is already starting or being tracked.
    #[error("a scrape job is already in progress ({0})")]
    AlreadyTracking(String),

    /// The operation needs a tracked job and there is none.
    #[error("no scrape job is being tracked")]
    NotTracking,
}
