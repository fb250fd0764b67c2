//! Source model - one scraped municipal website.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scraped website/municipality. Created once at onboarding and updated
/// with a last-scraped timestamp after each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Database row ID.
    pub id: i64,
    /// Display name, e.g. "Stadt Crailsheim".
    pub name: String,
    /// Base URL of the site. Unique across sources.
    pub base_url: String,
    /// Name of the adapter that scrapes this source.
    pub adapter: String,
    /// Inactive sources are skipped by scheduled runs.
    pub is_active: bool,
    /// When the last scrape run finished (success or failure).
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
