//! Location repository for SQLite persistence.
//!
//! Locations are append-only from the pipeline's point of view: rows are
//! created on first sighting of a raw name and only ever mutated by the
//! geocoding step or by curators. The (source_id, raw_name) uniqueness
//! constraint makes concurrent creation safe.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, to_option, Result};
use crate::models::{GeocodingStatus, Location, LocationStatus, NewLocation};

/// SQLite-backed location repository.
#[derive(Clone)]
pub struct LocationRepository {
    db_path: PathBuf,
}

fn map_location(row: &Row) -> rusqlite::Result<Location> {
    Ok(Location {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        raw_name: row.get("raw_name")?,
        display_name: row.get("display_name")?,
        street: row.get("street")?,
        house_number: row.get("house_number")?,
        postal_code: row.get("postal_code")?,
        city: row.get("city")?,
        country: row.get("country")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        geocoding_status: row
            .get::<_, Option<String>>("geocoding_status")?
            .as_deref()
            .and_then(GeocodingStatus::from_str),
        status: LocationStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(LocationStatus::Pending),
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}

impl LocationRepository {
    /// Create a new location repository, initializing the schema if needed.
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

    /// Get a location by ID.
    pub fn get(&self, id: i64) -> Result<Option<Location>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM locations WHERE id = ?")?;
        to_option(stmt.query_row(params![id], map_location))
    }

    /// Find a location by its exact raw name within one source.
    pub fn find(&self, source_id: i64, raw_name: &str) -> Result<Option<Location>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM locations WHERE source_id = ?1 AND raw_name = ?2")?;
        to_option(stmt.query_row(params![source_id, raw_name.trim()], map_location))
    }

    /// Cheap existence check, used by adapters to skip detail-page fetches
    /// for venues that are already on file.
    pub fn exists(&self, source_id: i64, raw_name: &str) -> Result<bool> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM locations WHERE source_id = ?1 AND raw_name = ?2",
            params![source_id, raw_name.trim()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Fetch the row for (source_id, raw_name), inserting it first if unseen.
    ///
    /// Returns the row plus whether this call created it. Insert-or-fetch
    /// rather than blind insert: a lost race against another writer still
    /// comes back with the surviving row and `created = false`.
    pub fn get_or_create(&self, new: &NewLocation) -> Result<(Location, bool)> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();

        let inserted = conn.execute(
            r#"
            INSERT INTO locations (
                source_id, raw_name, street, house_number, postal_code, city,
                latitude, longitude, status, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(source_id, raw_name) DO NOTHING
            "#,
            params![
                new.source_id,
                new.raw_name,
                new.street,
                new.house_number,
                new.postal_code,
                new.city,
                new.latitude,
                new.longitude,
                LocationStatus::Pending.as_str(),
                now,
            ],
        )?;

        let mut stmt =
            conn.prepare("SELECT * FROM locations WHERE source_id = ?1 AND raw_name = ?2")?;
        let location = stmt.query_row(params![new.source_id, new.raw_name], map_location)?;
        Ok((location, inserted > 0))
    }

    /// Record the outcome of the geocoding attempt for a location.
    ///
    /// Coordinates are only stored for unambiguous hits; ambiguous and
    /// failed attempts keep them NULL.
    pub fn record_geocoding(
        &self,
        id: i64,
        status: GeocodingStatus,
        coordinates: Option<(f64, f64)>,
    ) -> Result<()> {
        let conn = self.connect()?;
        let (latitude, longitude) = match coordinates {
            Some((lat, lon)) => (Some(lat), Some(lon)),
            None => (None, None),
        };
        conn.execute(
            r#"
            UPDATE locations
            SET geocoding_status = ?1, latitude = ?2, longitude = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                status.as_str(),
                latitude,
                longitude,
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        Ok(())
    }

    /// List locations in a workflow state, newest first. For curation views.
    pub fn list_by_status(&self, status: LocationStatus) -> Result<Vec<Location>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM locations WHERE status = ? ORDER BY created_at DESC")?;
        let locations = stmt
            .query_map(params![status.as_str()], map_location)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(locations)
    }

    /// All locations of one source.
    pub fn list_for_source(&self, source_id: i64) -> Result<Vec<Location>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM locations WHERE source_id = ? ORDER BY raw_name")?;
        let locations = stmt
            .query_map(params![source_id], map_location)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationSeed;
    use crate::repository::SourceRepository;

    fn setup() -> (tempfile::TempDir, LocationRepository, i64) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        let sources = SourceRepository::new(&path).expect("sources");
        let source = sources
            .get_or_create("Gemeinde Mulfingen", "https://www.mulfingen.de", "selector")
            .expect("source");
        let repo = LocationRepository::new(&path).expect("repo");
        (dir, repo, source.id)
    }

    #[test]
    fn get_or_create_creates_once() {
        let (_dir, repo, source_id) = setup();
        let new = NewLocation::from_seed(source_id, "Turnhalle Mulfingen", &LocationSeed::default());

        let (first, created) = repo.get_or_create(&new).expect("create");
        assert!(created);
        assert_eq!(first.status, LocationStatus::Pending);
        assert_eq!(first.geocoding_status, None);
        assert_eq!(first.country, "Deutschland");

        let (second, created) = repo.get_or_create(&new).expect("fetch");
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[test]
    fn raw_names_are_unique_per_source_not_globally() {
        let (dir, repo, source_id) = setup();
        let path = dir.path().join("test.db");
        let other = SourceRepository::new(&path)
            .expect("sources")
            .get_or_create("Gemeinde Kupferzell", "https://www.kupferzell.de", "selector")
            .expect("source");

        let seed = LocationSeed::default();
        let (a, _) = repo
            .get_or_create(&NewLocation::from_seed(source_id, "Stauseehalle", &seed))
            .expect("a");
        let (b, created) = repo
            .get_or_create(&NewLocation::from_seed(other.id, "Stauseehalle", &seed))
            .expect("b");

        assert!(created);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn exists_trims_lookup_name() {
        let (_dir, repo, source_id) = setup();
        let new = NewLocation::from_seed(source_id, "Rathaus", &LocationSeed::default());
        repo.get_or_create(&new).expect("create");

        assert!(repo.exists(source_id, "Rathaus").expect("exists"));
        assert!(repo.exists(source_id, "  Rathaus  ").expect("trimmed"));
        assert!(!repo.exists(source_id, "Festhalle").expect("missing"));
    }

    #[test]
    fn record_geocoding_success_stores_coordinates() {
        let (_dir, repo, source_id) = setup();
        let (location, _) = repo
            .get_or_create(&NewLocation::from_seed(
                source_id,
                "Turnhalle",
                &LocationSeed::default(),
            ))
            .expect("create");

        repo.record_geocoding(
            location.id,
            GeocodingStatus::Success,
            Some((49.3406, 9.8005)),
        )
        .expect("record");

        let reloaded = repo.get(location.id).expect("get").expect("exists");
        assert_eq!(reloaded.geocoding_status, Some(GeocodingStatus::Success));
        assert_eq!(reloaded.latitude, Some(49.3406));
        assert_eq!(reloaded.longitude, Some(9.8005));
    }

    #[test]
    fn record_geocoding_multiple_keeps_coordinates_null() {
        let (_dir, repo, source_id) = setup();
        let (location, _) = repo
            .get_or_create(&NewLocation::from_seed(
                source_id,
                "Rathaus",
                &LocationSeed::default(),
            ))
            .expect("create");

        repo.record_geocoding(location.id, GeocodingStatus::Multiple, None)
            .expect("record");

        let reloaded = repo.get(location.id).expect("get").expect("exists");
        assert_eq!(reloaded.geocoding_status, Some(GeocodingStatus::Multiple));
        assert!(!reloaded.has_coordinates());
    }

    #[test]
    fn seed_address_is_stored_on_creation() {
        let (_dir, repo, source_id) = setup();
        let seed = LocationSeed {
            street: Some("Schloßstraße".to_string()),
            postal_code: Some("74564".to_string()),
            city: Some("Crailsheim".to_string()),
            ..Default::default()
        };
        let (location, _) = repo
            .get_or_create(&NewLocation::from_seed(source_id, "Rathaus", &seed))
            .expect("create");

        assert_eq!(location.street.as_deref(), Some("Schloßstraße"));
        assert_eq!(location.postal_code.as_deref(), Some("74564"));
        assert_eq!(location.city.as_deref(), Some("Crailsheim"));
    }
}
