//! Scrape job snapshot as reported by the catalog backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a scrape job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job was created but the backend has not picked it up yet.
    Pending,
    /// Job is currently scraping.
    Running,
    /// Job finished successfully.
    Completed,
    /// Job stopped with an error.
    Failed,
    /// Job was cancelled before it finished.
    Cancelled,
}

impl JobStatus {
    /// Wire representation of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses never transition again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Latest known snapshot of a server-side scrape job.
///
/// The backend owns the authoritative state. A `Job` is only ever replaced
/// wholesale by a newer snapshot, never merged field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque identifier assigned by the backend.
    pub job_id: String,
    /// Name of the source being scraped.
    pub source_name: String,
    /// Current status.
    pub status: JobStatus,
    /// Number of items discovered (0 while the scope is still unknown).
    #[serde(default)]
    pub total: u64,
    /// Number of items processed so far.
    #[serde(default)]
    pub processed: u64,
    /// Products created by this job.
    #[serde(rename = "new_products", default)]
    pub new_count: u64,
    /// Existing products refreshed by this job.
    #[serde(rename = "updated", default)]
    pub updated_count: u64,
    /// Items that could not be processed.
    #[serde(rename = "errors", default)]
    pub error_count: u64,
    /// Products no longer present in the source catalog.
    #[serde(rename = "obsolete", default)]
    pub obsolete_count: u64,
    /// Server-computed progress, 0 to 100.
    #[serde(default, deserialize_with = "percent::deserialize")]
    pub progress_percent: u8,
    /// Item currently being processed.
    #[serde(rename = "current_product", default)]
    pub current_item_label: String,
    /// When the job started running.
    #[serde(default, with = "timestamp")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    #[serde(default, with = "timestamp")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure (or cancellation) reason.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Job {
    /// Create a fresh pending job.
    pub fn new(job_id: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            source_name: source_name.into(),
            status: JobStatus::Pending,
            total: 0,
            processed: 0,
            new_count: 0,
            updated_count: 0,
            error_count: 0,
            obsolete_count: 0,
            progress_percent: 0,
            current_item_label: String::new(),
            started_at: None,
            finished_at: None,
            error_message: None,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Force the snapshot into `Cancelled` without waiting for the backend.
    ///
    /// A snapshot that is already terminal is left untouched.
    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.status = JobStatus::Cancelled;
        self.finished_at.get_or_insert(now);
    }
}

/// `progress_percent` arrives as a float rounded to one decimal.
mod percent {
    use serde::{Deserialize, Deserializer};

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u8, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = f64::deserialize(deserializer)?;
        if raw.is_nan() {
            return Ok(0);
        }
        Ok(raw.round().clamp(0.0, 100.0) as u8)
    }
}

/// ISO 8601 timestamps, with or without an offset. Naive values are UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        parse(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}
