//! Scrape log repository for SQLite persistence.
//!
//! A log row is opened at run start and finalized exactly once; the
//! finalize statements only touch rows still in `running`, so a second
//! finalize attempt is a no-op.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, parse_datetime_opt, to_option, Result};
use crate::models::{RunStats, ScrapeLog, ScrapeStatus};

/// SQLite-backed scrape log repository.
#[derive(Clone)]
pub struct ScrapeLogRepository {
    db_path: PathBuf,
}

fn map_log(row: &Row) -> rusqlite::Result<ScrapeLog> {
    Ok(ScrapeLog {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        started_at: parse_datetime(&row.get::<_, String>("started_at")?),
        finished_at: parse_datetime_opt(row.get::<_, Option<String>>("finished_at")?),
        status: ScrapeStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(ScrapeStatus::Failed),
        events_found: row.get::<_, i64>("events_found")? as u64,
        events_new: row.get::<_, i64>("events_new")? as u64,
        events_updated: row.get::<_, i64>("events_updated")? as u64,
        geocoding_success: row.get::<_, i64>("geocoding_success")? as u64,
        geocoding_multiple: row.get::<_, i64>("geocoding_multiple")? as u64,
        geocoding_not_found: row.get::<_, i64>("geocoding_not_found")? as u64,
        geocoding_errors: row.get::<_, i64>("geocoding_errors")? as u64,
        error_message: row.get("error_message")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
    })
}

impl ScrapeLogRepository {
    /// Create a new scrape log repository, initializing the schema if needed.
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

    /// Open a new run for a source with status `running`.
    pub fn open(&self, source_id: i64) -> Result<ScrapeLog> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO scrape_logs (source_id, started_at, status, created_at)
            VALUES (?1, ?2, ?3, ?2)
            "#,
            params![source_id, now, ScrapeStatus::Running.as_str()],
        )?;
        let id = conn.last_insert_rowid();

        let mut stmt = conn.prepare("SELECT * FROM scrape_logs WHERE id = ?")?;
        Ok(stmt.query_row(params![id], map_log)?)
    }

    /// Finalize a run as successful. Returns false if the row was already
    /// finalized.
    pub fn finish_success(&self, id: i64, stats: &RunStats) -> Result<bool> {
        self.finalize(id, ScrapeStatus::Success, stats, None)
    }

    /// Finalize a run as failed with the captured error message.
    pub fn finish_failed(&self, id: i64, stats: &RunStats, error_message: &str) -> Result<bool> {
        self.finalize(id, ScrapeStatus::Failed, stats, Some(error_message))
    }

    fn finalize(
        &self,
        id: i64,
        status: ScrapeStatus,
        stats: &RunStats,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            r#"
            UPDATE scrape_logs
            SET finished_at = ?1,
                status = ?2,
                events_found = ?3,
                events_new = ?4,
                events_updated = ?5,
                geocoding_success = ?6,
                geocoding_multiple = ?7,
                geocoding_not_found = ?8,
                geocoding_errors = ?9,
                error_message = ?10
            WHERE id = ?11 AND status = 'running'
            "#,
            params![
                Utc::now().to_rfc3339(),
                status.as_str(),
                stats.events_found as i64,
                stats.events_new as i64,
                stats.events_updated as i64,
                stats.geocoding.success as i64,
                stats.geocoding.multiple as i64,
                stats.geocoding.not_found as i64,
                stats.geocoding.errors as i64,
                error_message,
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Get a log by ID.
    pub fn get(&self, id: i64) -> Result<Option<ScrapeLog>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM scrape_logs WHERE id = ?")?;
        to_option(stmt.query_row(params![id], map_log))
    }

    /// Most recent runs across all sources.
    pub fn recent(&self, limit: u32) -> Result<Vec<ScrapeLog>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM scrape_logs ORDER BY started_at DESC LIMIT ?")?;
        let logs = stmt
            .query_map(params![limit], map_log)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// Most recent runs of one source.
    pub fn recent_for_source(&self, source_id: i64, limit: u32) -> Result<Vec<ScrapeLog>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM scrape_logs WHERE source_id = ?1 ORDER BY started_at DESC LIMIT ?2",
        )?;
        let logs = stmt
            .query_map(params![source_id, limit], map_log)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(logs)
    }
}
