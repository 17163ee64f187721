//! In-memory stand-in for the catalog backend's admin API.
//!
//! Serves the scrape job and source website endpoints with the same paths,
//! payloads and error bodies as the real backend, so the client can be
//! exercised end to end without a database or live scrapers. Jobs advance
//! on a timer instead of scraping anything.
//!
//! Endpoints (under `/api/v1/admin`):
//! - GET /source-websites - List sources
//! - POST /source-websites/{id}/scrape-job - Start (or re-attach to) a job
//! - GET /scrape-jobs - List jobs
//! - GET /scrape-jobs/{job_id} - Job snapshot
//! - DELETE /scrape-jobs/{job_id} - Cancel a running job

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::API_KEY_HEADER;
use crate::models::{Job, JobStatus, SourceWebsite, StartJobResponse};

/// Path prefix of the admin API.
pub const API_PREFIX: &str = "/api/v1/admin";

/// Naive ISO 8601, the way the backend writes timestamps.
const WIRE_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Behaviour of the stub backend.
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Required `X-Admin-API-Key` value. `None` disables the check.
    pub api_key: Option<String>,
    /// Items each job discovers.
    pub items_per_job: u64,
    /// Time spent per item.
    pub step: Duration,
    /// Source whose jobs fail half-way.
    pub fail_source: Option<i64>,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            items_per_job: 50,
            step: Duration::from_millis(200),
            fail_source: None,
        }
    }
}

struct JobEntry {
    job: Job,
    source_id: i64,
    task: Option<JoinHandle<()>>,
}

impl JobEntry {
    /// The job as the backend serializes it.
    #[allow(clippy::cast_precision_loss)]
    fn wire(&self) -> Value {
        let job = &self.job;
        let percent = if job.total == 0 {
            0.0
        } else {
            (job.processed as f64 / job.total as f64 * 1000.0).round() / 10.0
        };

        let mut value = serde_json::to_value(job).unwrap_or_else(|_| json!({}));
        value["progress_percent"] = json!(percent);
        value["started_at"] = wire_timestamp(job.started_at);
        value["finished_at"] = wire_timestamp(job.finished_at);
        value
    }
}

fn wire_timestamp(ts: Option<DateTime<Utc>>) -> Value {
    ts.map_or(Value::Null, |ts| {
        Value::String(ts.naive_utc().format(WIRE_TIMESTAMP).to_string())
    })
}

/// Shared stub state.
struct StubState {
    config: StubConfig,
    sources: RwLock<Vec<SourceWebsite>>,
    jobs: RwLock<HashMap<String, JobEntry>>,
}

fn seed_sources() -> Vec<SourceWebsite> {
    [
        ("redlenic", "Redlenic", "https://redlenic.uy"),
        ("newredmayorista", "New Red Mayorista", "https://newredmayorista.com.uy"),
        ("decomoda", "Decomoda Mayorista", "https://decomoda.com.uy"),
        ("sina", "Sina", "https://sina.com.uy"),
        ("protrade", "Protrade", "https://protrade.com.uy"),
    ]
    .into_iter()
    .zip(1..)
    .map(|((name, display_name, base_url), id)| SourceWebsite {
        id,
        name: name.to_string(),
        display_name: display_name.to_string(),
        base_url: base_url.to_string(),
        is_active: true,
        notes: None,
        product_count: 0,
    })
    .collect()
}

/// Error body in the backend's `{"detail": ...}` shape.
struct StubError(StatusCode, &'static str);

impl IntoResponse for StubError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "detail": self.1 }))).into_response()
    }
}

// === Server Lifecycle ===

/// Build the stub's router.
pub fn router(config: StubConfig) -> Router {
    let state = Arc::new(StubState {
        config,
        sources: RwLock::new(seed_sources()),
        jobs: RwLock::new(HashMap::new()),
    });

    let admin = Router::new()
        .route("/source-websites", get(list_sources))
        .route("/source-websites/{source_id}/scrape-job", post(start_job))
        .route("/scrape-jobs", get(list_jobs))
        .route("/scrape-jobs/{job_id}", get(get_job).delete(cancel_job))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_api_key,
        ))
        .with_state(state);

    Router::new().nest(API_PREFIX, admin)
}

/// Serve the stub on `port` until Ctrl-C.
pub async fn serve(port: u16, config: StubConfig) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    println!("Stub backend listening on http://{addr}{API_PREFIX}");
    if config.api_key.is_none() {
        println!("API key check disabled");
    }

    axum::serve(listener, router(config))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    Ok(())
}

/// Serve the stub on an ephemeral local port in the background.
///
/// Returns the admin API base URL.
#[cfg(test)]
pub async fn spawn_local(config: StubConfig) -> Result<String> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .context("Failed to bind stub backend")?;
    let addr = listener.local_addr()?;

    let app = router(config);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "stub backend stopped");
        }
    });

    Ok(format!("http://{addr}{API_PREFIX}"))
}

// === Handlers ===

async fn require_api_key(
    State(state): State<Arc<StubState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(request).await;
    };

    match request.headers().get(API_KEY_HEADER) {
        None => StubError(StatusCode::UNAUTHORIZED, "Missing API key").into_response(),
        Some(key) if key.as_bytes() != expected.as_bytes() => {
            StubError(StatusCode::UNAUTHORIZED, "Invalid API key").into_response()
        }
        Some(_) => next.run(request).await,
    }
}

async fn list_sources(State(state): State<Arc<StubState>>) -> Json<Value> {
    let sources = state.sources.read().await;
    Json(json!({ "items": sources.as_slice(), "total": sources.len() }))
}

async fn start_job(
    State(state): State<Arc<StubState>>,
    Path(source_id): Path<i64>,
) -> Result<Json<Value>, StubError> {
    let source_name = state
        .sources
        .read()
        .await
        .iter()
        .find(|s| s.id == source_id)
        .map(|s| s.name.clone())
        .ok_or(StubError(StatusCode::NOT_FOUND, "Source website not found"))?;

    let mut jobs = state.jobs.write().await;

    if let Some(entry) = jobs
        .values()
        .find(|e| e.source_id == source_id && !e.job.is_terminal())
    {
        debug!(job_id = %entry.job.job_id, "job already running for source");
        return Ok(Json(json!({
            "message": StartJobResponse::ALREADY_RUNNING,
            "job": entry.wire(),
        })));
    }

    let job_id = Uuid::new_v4().simple().to_string()[..8].to_string();
    let entry = JobEntry {
        job: Job::new(&job_id, &source_name),
        source_id,
        task: Some(tokio::spawn(run_job(
            Arc::clone(&state),
            job_id.clone(),
            source_id,
        ))),
    };
    let body = json!({ "message": "Scrape job started", "job": entry.wire() });
    jobs.insert(job_id.clone(), entry);

    info!(job_id = %job_id, source = %source_name, "stub job started");
    Ok(Json(body))
}

async fn list_jobs(State(state): State<Arc<StubState>>) -> Json<Value> {
    let jobs = state.jobs.read().await;
    let mut entries: Vec<&JobEntry> = jobs.values().collect();
    entries.sort_by(|a, b| b.job.started_at.cmp(&a.job.started_at));
    Json(json!({ "jobs": entries.iter().map(|e| e.wire()).collect::<Vec<_>>() }))
}

async fn get_job(
    State(state): State<Arc<StubState>>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, StubError> {
    let jobs = state.jobs.read().await;
    let entry = jobs
        .get(&job_id)
        .ok_or(StubError(StatusCode::NOT_FOUND, "Job not found"))?;
    Ok(Json(json!({ "job": entry.wire() })))
}

async fn cancel_job(
    State(state): State<Arc<StubState>>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, StubError> {
    let mut jobs = state.jobs.write().await;
    let entry = jobs
        .get_mut(&job_id)
        .filter(|e| !e.job.is_terminal())
        .ok_or(StubError(StatusCode::NOT_FOUND, "Job not found or not running"))?;

    if let Some(task) = entry.task.take() {
        task.abort();
    }
    entry.job.mark_cancelled(Utc::now());
    entry.job.current_item_label.clear();

    info!(job_id = %job_id, "stub job cancelled");
    Ok(Json(json!({ "message": "Job cancelled", "job_id": job_id })))
}

// === Simulated scraping ===

/// Advance a job one item per step until it completes or fails.
async fn run_job(state: Arc<StubState>, job_id: String, source_id: i64) {
    let StubConfig {
        items_per_job: total,
        step,
        fail_source,
        ..
    } = state.config;

    // Discovery: running, scope still unknown.
    tokio::time::sleep(step).await;
    if !update(&state, &job_id, |job| {
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
    })
    .await
    {
        return;
    }

    tokio::time::sleep(step).await;
    update(&state, &job_id, |job| job.total = total).await;

    for processed in 1..=total {
        tokio::time::sleep(step).await;

        if fail_source == Some(source_id) && processed > total / 2 {
            update(&state, &job_id, |job| {
                job.status = JobStatus::Failed;
                job.error_message = Some(format!(
                    "Scraper for {} stopped responding",
                    job.source_name
                ));
                job.current_item_label.clear();
                job.finished_at = Some(Utc::now());
            })
            .await;
            warn!(job_id = %job_id, "stub job failed");
            return;
        }

        let is_new = processed % 3 != 0;
        let tracked = update(&state, &job_id, |job| {
            job.processed = processed;
            job.current_item_label = format!("Producto {processed}");
            if is_new {
                job.new_count += 1;
            } else {
                job.updated_count += 1;
            }
        })
        .await;
        if !tracked {
            return;
        }

        if is_new {
            let mut sources = state.sources.write().await;
            if let Some(source) = sources.iter_mut().find(|s| s.id == source_id) {
                source.product_count += 1;
            }
        }
    }

    update(&state, &job_id, |job| {
        job.status = JobStatus::Completed;
        job.current_item_label.clear();
        job.finished_at = Some(Utc::now());
    })
    .await;
    info!(job_id = %job_id, "stub job completed");
}

/// Apply `f` to a live job. Returns false once the job is gone or terminal.
async fn update(state: &StubState, job_id: &str, f: impl FnOnce(&mut Job)) -> bool {
    let mut jobs = state.jobs.write().await;
    match jobs.get_mut(job_id) {
        Some(entry) if !entry.job.is_terminal() => {
            f(&mut entry.job);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AdminClient, ClientOptions, JobApi};
    use crate::jobs::{outcome, JobController, PollerConfig};
    use crate::error::JobError;

    fn client_for(base_url: &str) -> Arc<AdminClient> {
        Arc::new(
            AdminClient::new(ClientOptions {
                base_url: base_url.to_string(),
                api_key: "secret".to_string(),
                connect_timeout: Duration::from_secs(2),
                request_timeout: Duration::from_secs(5),
            })
            .unwrap(),
        )
    }

    fn fast(items: u64) -> StubConfig {
        StubConfig {
            api_key: Some("secret".to_string()),
            items_per_job: items,
            step: Duration::from_millis(5),
            fail_source: None,
        }
    }

    #[test]
    fn test_wire_uses_naive_timestamps_and_decimal_percent() {
        let mut job = Job::new("abcd1234", "sina");
        job.total = 3;
        job.processed = 1;
        job.started_at = Some(Utc::now());
        let entry = JobEntry {
            job,
            source_id: 4,
            task: None,
        };

        let wire = entry.wire();
        assert_eq!(wire["progress_percent"], json!(33.3));
        let started = wire["started_at"].as_str().unwrap();
        assert!(!started.ends_with('Z') && !started.contains('+'));
        assert_eq!(wire["finished_at"], Value::Null);
        assert_eq!(wire["current_product"], json!(""));
    }

    #[test]
    fn test_seeded_sources_have_sequential_ids() {
        let sources = seed_sources();
        let ids: Vec<i64> = sources.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(sources[4].name, "protrade");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_rejected() {
        let base_url = spawn_local(fast(1)).await.unwrap();
        let resp = reqwest::get(format!("{base_url}/scrape-jobs")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["detail"], "Missing API key");
    }

    #[tokio::test]
    async fn test_job_runs_to_completion_and_updates_source() {
        let base_url = spawn_local(fast(4)).await.unwrap();
        let client = client_for(&base_url);

        let started = client.start_job(2).await.unwrap();
        assert_eq!(started.job.status, JobStatus::Pending);
        assert_eq!(started.job.source_name, "newredmayorista");

        let mut job = started.job;
        for _ in 0..200 {
            job = client.fetch_job(&job.job_id).await.unwrap();
            if job.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!((job.processed, job.total), (4, 4));
        assert_eq!(job.progress_percent, 100);
        assert_eq!((job.new_count, job.updated_count), (3, 1));
        assert!(job.current_item_label.is_empty());
        assert!(job.started_at.is_some() && job.finished_at.is_some());
        assert!(job.error_message.is_none());

        let sources = client.list_sources().await.unwrap();
        assert_eq!(sources[1].product_count, 3);

        let err = client.cancel_job(&job.job_id).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("not running"));
    }

    #[tokio::test]
    async fn test_controller_tracks_failing_job_against_stub() {
        let config = StubConfig {
            fail_source: Some(3),
            ..fast(6)
        };
        let base_url = spawn_local(config).await.unwrap();
        let controller =
            JobController::new(client_for(&base_url), PollerConfig::every(Duration::from_millis(10)));

        controller.start(3).await.unwrap();
        let job = tokio::time::timeout(Duration::from_secs(5), controller.wait_for_terminal())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.processed, 3);
        match outcome(job) {
            Err(JobError::JobFailed { message, .. }) => {
                assert_eq!(message, "Scraper for decomoda stopped responding");
            }
            other => panic!("expected a failed job, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_controller_cancel_reaches_stub() {
        let config = StubConfig {
            step: Duration::from_secs(60),
            ..fast(10)
        };
        let base_url = spawn_local(config).await.unwrap();
        let client = client_for(&base_url);
        let controller = JobController::new(Arc::clone(&client), PollerConfig::default());

        let job = controller.start(5).await.unwrap();
        let cancellation = controller.cancel().unwrap();
        cancellation.request.await.unwrap();

        let remote = client.fetch_job(&job.job_id).await.unwrap();
        assert_eq!(remote.status, JobStatus::Cancelled);
        assert!(remote.finished_at.is_some());
    }
}
