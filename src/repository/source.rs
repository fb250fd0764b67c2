//! Source repository for SQLite persistence.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, parse_datetime_opt, to_option, Result};
use crate::models::Source;

/// SQLite-backed source repository.
#[derive(Clone)]
pub struct SourceRepository {
    db_path: PathBuf,
}

fn map_source(row: &Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get("id")?,
        name: row.get("name")?,
        base_url: row.get("base_url")?,
        adapter: row.get("adapter")?,
        is_active: row.get("is_active")?,
        last_scraped_at: parse_datetime_opt(row.get::<_, Option<String>>("last_scraped_at")?),
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}

impl SourceRepository {
    /// Create a new source repository, initializing the schema if needed.
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

    /// Get a source by ID.
    pub fn get(&self, id: i64) -> Result<Option<Source>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM sources WHERE id = ?")?;
        to_option(stmt.query_row(params![id], map_source))
    }

    /// Get a source by its unique base URL.
    pub fn get_by_base_url(&self, base_url: &str) -> Result<Option<Source>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM sources WHERE base_url = ?")?;
        to_option(stmt.query_row(params![base_url], map_source))
    }

    /// Get all sources, ordered by name.
    pub fn get_all(&self) -> Result<Vec<Source>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM sources ORDER BY name")?;
        let sources = stmt
            .query_map([], map_source)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    /// Get the existing source for a base URL or onboard a new one.
    pub fn get_or_create(&self, name: &str, base_url: &str, adapter: &str) -> Result<Source> {
        if let Some(source) = self.get_by_base_url(base_url)? {
            return Ok(source);
        }

        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        // ON CONFLICT: another process may have onboarded the same base_url
        // between the lookup above and this insert.
        conn.execute(
            r#"
            INSERT INTO sources (name, base_url, adapter, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            ON CONFLICT(base_url) DO NOTHING
            "#,
            params![name, base_url, adapter, now],
        )?;

        let mut stmt = conn.prepare("SELECT * FROM sources WHERE base_url = ?")?;
        Ok(stmt.query_row(params![base_url], map_source)?)
    }

    /// Update last scraped timestamp.
    pub fn update_last_scraped(&self, id: i64, timestamp: DateTime<Utc>) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE sources SET last_scraped_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![timestamp.to_rfc3339(), Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Flip the active flag.
    pub fn set_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE sources SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![active, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (tempfile::TempDir, SourceRepository) {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = SourceRepository::new(&dir.path().join("test.db")).expect("repo");
        (dir, repo)
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let (_dir, repo) = repo();

        let a = repo
            .get_or_create("Gemeinde Mulfingen", "https://www.mulfingen.de", "selector")
            .expect("create");
        let b = repo
            .get_or_create("Gemeinde Mulfingen", "https://www.mulfingen.de", "selector")
            .expect("fetch");

        assert_eq!(a.id, b.id);
        assert_eq!(repo.get_all().expect("all").len(), 1);
    }

    #[test]
    fn last_scraped_round_trip() {
        let (_dir, repo) = repo();
        let source = repo
            .get_or_create("Stadt Crailsheim", "https://www.crailsheim.de", "selector")
            .expect("create");
        assert!(source.last_scraped_at.is_none());

        let ts = Utc::now();
        repo.update_last_scraped(source.id, ts).expect("update");

        let reloaded = repo.get(source.id).expect("get").expect("exists");
        assert_eq!(reloaded.last_scraped_at, Some(ts));
    }

    #[test]
    fn set_active_flag() {
        let (_dir, repo) = repo();
        let source = repo
            .get_or_create("Stadt Crailsheim", "https://www.crailsheim.de", "selector")
            .expect("create");
        assert!(source.is_active);

        repo.set_active(source.id, false).expect("deactivate");
        let reloaded = repo.get(source.id).expect("get").expect("exists");
        assert!(!reloaded.is_active);
    }
}
