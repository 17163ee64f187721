//! Access to the catalog backend's scrape job endpoints.

mod client;

use std::future::Future;

use crate::error::ApiError;
use crate::models::{Job, StartJobResponse};

pub use client::{AdminClient, ClientOptions, API_KEY_HEADER};

/// The three calls the job tracking core needs from the backend.
///
/// `AdminClient` is the HTTP implementation; tests substitute scripted fakes.
pub trait JobApi: Send + Sync + 'static {
    /// Start a scrape job for a source website.
    fn start_job(
        &self,
        source_id: i64,
    ) -> impl Future<Output = Result<StartJobResponse, ApiError>> + Send;

    /// Fetch the latest snapshot of a job.
    fn fetch_job(&self, job_id: &str) -> impl Future<Output = Result<Job, ApiError>> + Send;

    /// Ask the backend to cancel a job.
    fn cancel_job(&self, job_id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;
}
