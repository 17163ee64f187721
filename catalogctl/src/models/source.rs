//! Source website model (the sites scrape jobs run against).

use serde::{Deserialize, Serialize};

/// A supplier website the backend can scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceWebsite {
    /// Backend identifier, used to start scrape jobs.
    pub id: i64,
    /// Unique machine name (also the job's `source_name`).
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Base URL of the site.
    pub base_url: String,
    /// Whether the source is enabled.
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Number of products imported from this source.
    #[serde(default)]
    pub product_count: u64,
}

const fn default_active() -> bool {
    true
}

/// Response of `GET /source-websites`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceWebsiteList {
    pub items: Vec<SourceWebsite>,
    pub total: usize,
}
