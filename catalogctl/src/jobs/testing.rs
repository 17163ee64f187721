//! Scripted in-memory backend for poller and controller tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::api::JobApi;
use crate::error::ApiError;
use crate::models::{Job, JobStatus, StartJobResponse};

/// Fake `JobApi` answering from queues of canned responses.
#[derive(Default)]
pub struct ScriptedApi {
    starts: Mutex<VecDeque<Result<StartJobResponse, ApiError>>>,
    fetches: Mutex<VecDeque<Result<Job, ApiError>>>,
    cancels: Mutex<Vec<String>>,
    cancel_fails: Mutex<bool>,
    fetch_delay: Mutex<Option<Duration>>,
    start_gate: Mutex<Option<Arc<Notify>>>,
    start_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn push_start(&self, response: Result<StartJobResponse, ApiError>) {
        self.starts.lock().unwrap().push_back(response);
    }

    pub fn push_started(&self, job: Job) {
        self.push_start(Ok(StartJobResponse {
            message: Some("Scrape job started".to_string()),
            job,
        }));
    }

    pub fn push_fetch(&self, response: Result<Job, ApiError>) {
        self.fetches.lock().unwrap().push_back(response);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    /// Make start requests block until `open_starts` is called.
    pub fn hold_starts(&self) {
        *self.start_gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    pub fn open_starts(&self) {
        if let Some(gate) = self.start_gate.lock().unwrap().take() {
            gate.notify_waiters();
        }
    }

    pub fn fail_cancels(&self) {
        *self.cancel_fails.lock().unwrap() = true;
    }

    pub fn start_count(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn cancelled_ids(&self) -> Vec<String> {
        self.cancels.lock().unwrap().clone()
    }
}

fn server_error() -> ApiError {
    ApiError::Status {
        status: 503,
        message: "no scripted response".to_string(),
    }
}

impl JobApi for ScriptedApi {
    async fn start_job(&self, _source_id: i64) -> Result<StartJobResponse, ApiError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.start_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.starts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(server_error()))
    }

    async fn fetch_job(&self, _job_id: &str) -> Result<Job, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(server_error()))
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
        self.cancels.lock().unwrap().push(job_id.to_string());
        if *self.cancel_fails.lock().unwrap() {
            return Err(server_error());
        }
        Ok(())
    }
}

/// A running snapshot with the given progress.
pub fn running(job_id: &str, processed: u64, total: u64, percent: u8) -> Job {
    let mut job = Job::new(job_id, "redlenic");
    job.status = JobStatus::Running;
    job.processed = processed;
    job.total = total;
    job.progress_percent = percent;
    job.current_item_label = format!("Producto {processed}");
    job
}

/// A snapshot with only the status set, consistent with the job invariants.
pub fn with_status(job_id: &str, status: JobStatus) -> Job {
    let mut job = Job::new(job_id, "redlenic");
    job.status = status;
    if status.is_terminal() {
        job.finished_at = Some(chrono::Utc::now());
    }
    if status == JobStatus::Failed {
        job.error_message = Some("Source website 1 not found".to_string());
    }
    job
}
