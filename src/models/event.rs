//! Event models - single occurrences deduplicated per source.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::LocationSeed;

/// A single event occurrence as persisted.
///
/// (source_id, external_id) is the upsert key; events vanished from the
/// source site are soft-deleted, never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Database row ID.
    pub id: i64,
    pub source_id: i64,
    /// Set once the raw location text has been matched to a location row.
    pub location_id: Option<i64>,
    /// Source-scoped dedup key, stable across runs for the same event.
    pub external_id: String,
    pub title: String,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub event_end_date: Option<NaiveDate>,
    pub event_end_time: Option<NaiveTime>,
    /// Detail page URL.
    pub url: Option<String>,
    /// Venue text as scraped; fallback for display when unmatched.
    pub raw_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the event disappeared from the source's latest full scrape.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Canonical event shape produced by the normalizer, ready for upsert.
///
/// Carries the raw location text as the matching seed plus any address data
/// the adapter collected for it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub external_id: String,
    pub title: String,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub event_end_date: Option<NaiveDate>,
    pub event_end_time: Option<NaiveTime>,
    pub url: Option<String>,
    pub raw_location: Option<String>,
    pub location_seed: LocationSeed,
}
