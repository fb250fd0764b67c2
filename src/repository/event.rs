//! Event repository for SQLite persistence.
//!
//! Events are keyed by (source_id, external_id) and upserted in place; an
//! event missing from the latest full scrape of its source is soft-deleted
//! during reconciliation and revived if it reappears later. Reads filter
//! soft-deleted rows unless a caller explicitly asks for history.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, Row};

use super::{
    format_date, format_time, parse_date, parse_date_opt, parse_datetime, parse_datetime_opt,
    parse_time_opt, to_option, Result,
};
use crate::models::{Event, EventDraft};

/// Whether an upsert inserted a fresh row or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// SQLite-backed event repository.
#[derive(Clone)]
pub struct EventRepository {
    db_path: PathBuf,
}

fn map_event(row: &Row) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        location_id: row.get("location_id")?,
        external_id: row.get("external_id")?,
        title: row.get("title")?,
        event_date: parse_date(&row.get::<_, String>("event_date")?),
        event_time: parse_time_opt(row.get::<_, Option<String>>("event_time")?),
        event_end_date: parse_date_opt(row.get::<_, Option<String>>("event_end_date")?),
        event_end_time: parse_time_opt(row.get::<_, Option<String>>("event_end_time")?),
        url: row.get("url")?,
        raw_location: row.get("raw_location")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
        deleted_at: parse_datetime_opt(row.get::<_, Option<String>>("deleted_at")?),
    })
}

impl EventRepository {
    /// Create a new event repository, initializing the schema if needed.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        super::connect_and_init(&repo.db_path)?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    /// Get an event by ID, soft-deleted rows included.
    pub fn get(&self, id: i64) -> Result<Option<Event>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM events WHERE id = ?")?;
        to_option(stmt.query_row(params![id], map_event))
    }

    /// Find a live event by its dedup key.
    pub fn find(&self, source_id: i64, external_id: &str) -> Result<Option<Event>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM events
            WHERE source_id = ?1 AND external_id = ?2 AND deleted_at IS NULL
            "#,
        )?;
        to_option(stmt.query_row(params![source_id, external_id], map_event))
    }

    /// Find an event by its dedup key, soft-deleted rows included.
    pub fn find_including_deleted(
        &self,
        source_id: i64,
        external_id: &str,
    ) -> Result<Option<Event>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM events WHERE source_id = ?1 AND external_id = ?2")?;
        to_option(stmt.query_row(params![source_id, external_id], map_event))
    }

    /// Insert or update an event, keyed by (source_id, external_id).
    ///
    /// Updates rewrite all mutable fields and clear deleted_at so a vanished
    /// event that reappears comes back to life. A lost insert race is
    /// retried as an update: the unique key is the authority, not the path
    /// we took to get there.
    pub fn upsert(
        &self,
        source_id: i64,
        location_id: Option<i64>,
        draft: &EventDraft,
    ) -> Result<UpsertOutcome> {
        let conn = self.connect()?;

        if self.update_existing(&conn, source_id, location_id, draft)? {
            return Ok(UpsertOutcome::Updated);
        }

        match self.insert_new(&conn, source_id, location_id, draft) {
            Ok(()) => Ok(UpsertOutcome::Created),
            Err(rusqlite::Error::SqliteFailure(e, msg))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                // Raced another writer on the unique key; their insert won.
                // A constraint failure with no row to update was something
                // else (e.g. a bad foreign key) and stays an error.
                if self.update_existing(&conn, source_id, location_id, draft)? {
                    Ok(UpsertOutcome::Updated)
                } else {
                    Err(rusqlite::Error::SqliteFailure(e, msg).into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn insert_new(
        &self,
        conn: &Connection,
        source_id: i64,
        location_id: Option<i64>,
        draft: &EventDraft,
    ) -> rusqlite::Result<()> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO events (
                source_id, location_id, external_id, title,
                event_date, event_time, event_end_date, event_end_time,
                url, raw_location, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            "#,
            params![
                source_id,
                location_id,
                draft.external_id,
                draft.title,
                format_date(draft.event_date),
                draft.event_time.map(format_time),
                draft.event_end_date.map(format_date),
                draft.event_end_time.map(format_time),
                draft.url,
                draft.raw_location,
                now,
            ],
        )?;
        Ok(())
    }

    /// Update the row for the dedup key, if present. Returns whether a row
    /// was touched. location_id is only overwritten when the new value is
    /// known, so a run without detail data keeps an earlier match.
    fn update_existing(
        &self,
        conn: &Connection,
        source_id: i64,
        location_id: Option<i64>,
        draft: &EventDraft,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            r#"
            UPDATE events
            SET title = ?1,
                event_date = ?2,
                event_time = ?3,
                event_end_date = ?4,
                event_end_time = ?5,
                url = ?6,
                raw_location = ?7,
                location_id = COALESCE(?8, location_id),
                deleted_at = NULL,
                updated_at = ?9
            WHERE source_id = ?10 AND external_id = ?11
            "#,
            params![
                draft.title,
                format_date(draft.event_date),
                draft.event_time.map(format_time),
                draft.event_end_date.map(format_date),
                draft.event_end_time.map(format_time),
                draft.url,
                draft.raw_location,
                location_id,
                now,
                source_id,
                draft.external_id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Soft-delete every live event of a source that was not seen in the
    /// run that just finished. Returns how many rows were marked.
    pub fn reconcile_run(
        &self,
        source_id: i64,
        seen_external_ids: &HashSet<String>,
        run_started_at: DateTime<Utc>,
    ) -> Result<u64> {
        let conn = self.connect()?;

        let mut stmt =
            conn.prepare("SELECT id, external_id FROM events WHERE source_id = ? AND deleted_at IS NULL")?;
        let live: Vec<(i64, String)> = stmt
            .query_map(params![source_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let stale: Vec<i64> = live
            .into_iter()
            .filter(|(_, external_id)| !seen_external_ids.contains(external_id))
            .map(|(id, _)| id)
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        // Row ids are integers, safe to inline.
        let id_list = stale
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!("UPDATE events SET deleted_at = ?1, updated_at = ?1 WHERE id IN ({id_list})");
        conn.execute(&sql, params![run_started_at.to_rfc3339()])?;

        Ok(stale.len() as u64)
    }

    /// All live events of a source, soonest first.
    pub fn list_for_source(&self, source_id: i64) -> Result<Vec<Event>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM events
            WHERE source_id = ? AND deleted_at IS NULL
            ORDER BY event_date, event_time
            "#,
        )?;
        let events = stmt
            .query_map(params![source_id], map_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// All events of a source including soft-deleted history.
    pub fn list_for_source_with_deleted(&self, source_id: i64) -> Result<Vec<Event>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT * FROM events WHERE source_id = ? ORDER BY event_date, event_time")?;
        let events = stmt
            .query_map(params![source_id], map_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Number of live events for a source.
    pub fn count_live(&self, source_id: i64) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE source_id = ? AND deleted_at IS NULL",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
