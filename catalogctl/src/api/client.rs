//! HTTP client for the catalog backend's admin API.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::JobApi;
use crate::error::ApiError;
use crate::models::{Job, JobEnvelope, JobList, SourceWebsite, SourceWebsiteList, StartJobResponse};

/// Header carrying the admin credential.
pub const API_KEY_HEADER: &str = "X-Admin-API-Key";

/// Error bodies longer than this are truncated before being surfaced.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Connection settings for [`AdminClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Admin API root, e.g. `http://localhost:8000/api/v1/admin`.
    pub base_url: String,
    /// Opaque admin credential sent with every request.
    pub api_key: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub request_timeout: Duration,
}

/// Admin API client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: Client,
    base_url: String,
    api_key: String,
    request_timeout: Duration,
}

impl AdminClient {
    /// Build a client with the given options.
    pub fn new(options: ClientOptions) -> Result<Self, ApiError> {
        let http = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .map_err(|source| ApiError::Transport {
                url: options.base_url.clone(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            api_key: options.api_key,
            request_timeout: options.request_timeout,
        })
    }

    #[cfg(test)]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List every job the backend still remembers, active or finished.
    pub async fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
        let url = format!("{}/scrape-jobs", self.base_url);
        let list: JobList = self.send_json(Method::GET, &url).await?;
        Ok(list.jobs)
    }

    /// List the configured source websites.
    pub async fn list_sources(&self) -> Result<Vec<SourceWebsite>, ApiError> {
        let url = format!("{}/source-websites", self.base_url);
        let list: SourceWebsiteList = self.send_json(Method::GET, &url).await?;
        Ok(list.items)
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/scrape-jobs/{}", self.base_url, urlencoding::encode(job_id))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
    }

    async fn send(&self, method: Method, url: &str) -> Result<reqwest::Response, ApiError> {
        debug!(%method, url, "backend request");

        let resp = self
            .request(method, url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, method: Method, url: &str) -> Result<T, ApiError> {
        let resp = self.send(method, url).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| self.transport_error(url, e))?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    fn transport_error(&self, url: &str, source: reqwest::Error) -> ApiError {
        if source.is_timeout() {
            ApiError::Timeout(self.request_timeout)
        } else {
            ApiError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }
}

impl JobApi for AdminClient {
    async fn start_job(&self, source_id: i64) -> Result<StartJobResponse, ApiError> {
        let url = format!("{}/source-websites/{source_id}/scrape-job", self.base_url);
        self.send_json(Method::POST, &url).await
    }

    async fn fetch_job(&self, job_id: &str) -> Result<Job, ApiError> {
        let url = self.job_url(job_id);
        let envelope: JobEnvelope = self.send_json(Method::GET, &url).await?;
        Ok(envelope.job)
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
        let url = self.job_url(job_id);
        self.send(Method::DELETE, &url).await?;
        Ok(())
    }
}

/// Pull the human-readable message out of an error body.
///
/// The backend answers either `{"detail": ...}` or `{"error": ..., "message": ...}`.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["detail", "message"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) => return Some(s.clone()),
                Some(other) if !other.is_null() => return Some(other.to_string()),
                _ => {}
            }
        }
    }

    if trimmed.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        Some(format!("{}... (truncated)", &trimmed[..end]))
    } else {
        Some(trimmed.to_string())
    }
}
