//! Repository layer for SQLite persistence.
//!
//! Each repository owns the database path and opens a connection per
//! operation. Uniqueness constraints live in the schema so that racing
//! writers cannot create duplicate rows even without process-level locking.

pub mod event;
pub mod location;
pub mod scrape_log;
pub mod source;

pub use event::{EventRepository, UpsertOutcome};
pub use location::LocationRepository;
pub use scrape_log::ScrapeLogRepository;
pub use source::SourceRepository;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

/// Errors surfaced by the repository layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Full schema. Tables are declared in foreign-key order; repositories all
/// run this on construction, so any of them can be built first.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    base_url TEXT NOT NULL UNIQUE,
    adapter TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_scraped_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    raw_name TEXT NOT NULL,
    display_name TEXT,
    street TEXT,
    house_number TEXT,
    postal_code TEXT CHECK (length(postal_code) <= 10),
    city TEXT,
    country TEXT NOT NULL DEFAULT 'Deutschland',
    latitude REAL,
    longitude REAL,
    geocoding_status TEXT
        CHECK (geocoding_status IN ('success', 'multiple', 'not_found', 'error')),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'confirmed', 'ignored')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (source_id, raw_name)
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    location_id INTEGER REFERENCES locations(id) ON DELETE SET NULL,
    external_id TEXT NOT NULL,
    title TEXT NOT NULL,
    event_date TEXT NOT NULL,
    event_time TEXT,
    event_end_date TEXT,
    event_end_time TEXT,
    url TEXT,
    raw_location TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    UNIQUE (source_id, external_id)
);

CREATE TABLE IF NOT EXISTS scrape_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL
        CHECK (status IN ('running', 'success', 'failed')),
    events_found INTEGER NOT NULL DEFAULT 0,
    events_new INTEGER NOT NULL DEFAULT 0,
    events_updated INTEGER NOT NULL DEFAULT 0,
    geocoding_success INTEGER NOT NULL DEFAULT 0,
    geocoding_multiple INTEGER NOT NULL DEFAULT 0,
    geocoding_not_found INTEGER NOT NULL DEFAULT 0,
    geocoding_errors INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL
);
"#;

/// Open a connection with the pragmas the pipeline relies on.
pub(crate) fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

/// Open a connection and make sure the schema exists.
pub(crate) fn connect_and_init(db_path: &Path) -> Result<Connection> {
    let conn = connect(db_path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// Create the database file and schema without constructing repositories.
pub fn initialize(db_path: &Path) -> Result<()> {
    connect_and_init(db_path)?;
    Ok(())
}

/// Map "no rows" to None instead of an error.
pub(crate) fn to_option<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// Parse a stored calendar date (ISO), defaulting to the epoch date on error.
pub(crate) fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_default()
}

pub(crate) fn parse_date_opt(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

/// Times are stored as "HH:MM"; accept a seconds suffix from older rows.
pub(crate) fn parse_time_opt(s: Option<String>) -> Option<NaiveTime> {
    s.and_then(|s| {
        NaiveTime::parse_from_str(&s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M"))
            .ok()
    })
}

pub(crate) fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}
