//! Scrape run log models - the immutable audit trail of pipeline runs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::GeocodingStatus;

/// Lifecycle of a scrape run: `running -> success | failed`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Running,
    Success,
    Failed,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One execution of the pipeline against one source.
///
/// Finalized exactly once; a process killed mid-run leaves the row at
/// `running` forever, which consumers detect via [`ScrapeLog::is_stale`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeLog {
    /// Database row ID.
    pub id: i64,
    pub source_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: ScrapeStatus,
    pub events_found: u64,
    pub events_new: u64,
    pub events_updated: u64,
    pub geocoding_success: u64,
    pub geocoding_multiple: u64,
    pub geocoding_not_found: u64,
    pub geocoding_errors: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScrapeLog {
    /// A run still marked running but started longer than `threshold` ago
    /// was interrupted and should be treated as failed by consumers.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.status == ScrapeStatus::Running
            && self.finished_at.is_none()
            && Utc::now() - self.started_at > threshold
    }
}

/// Geocoding outcome counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeocodingStats {
    pub success: u64,
    pub multiple: u64,
    pub not_found: u64,
    pub errors: u64,
}

impl GeocodingStats {
    pub fn record(&mut self, status: GeocodingStatus) {
        match status {
            GeocodingStatus::Success => self.success += 1,
            GeocodingStatus::Multiple => self.multiple += 1,
            GeocodingStatus::NotFound => self.not_found += 1,
            GeocodingStatus::Error => self.errors += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.success + self.multiple + self.not_found + self.errors
    }
}

/// Counters accumulated while a run is in flight and written into the
/// scrape log on finalization.
///
/// `events_skipped` and `not_mappable` are reported in the run summary but
/// have no column of their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub events_found: u64,
    pub events_new: u64,
    pub events_updated: u64,
    /// Dropped events: in-run duplicates and validation failures.
    pub events_skipped: u64,
    /// Soft-deleted during reconciliation because they vanished from the site.
    pub events_deleted: u64,
    /// Events with neither a raw location nor a resolved location.
    pub not_mappable: u64,
    pub geocoding: GeocodingStats,
}
