//! Location resolver.
//!
//! Maps raw venue text (scoped to one source) to a location row, creating
//! the row on first sighting and attempting geocoding at most once per
//! location. Matching is exact string equality on the trimmed raw name -
//! deliberately no fuzzy logic.

use std::sync::Arc;

use tracing::warn;

use crate::models::{GeocodingStatus, Location, LocationSeed, NewLocation};
use crate::repository::{self, LocationRepository};
use crate::scrapers::LocationProbe;
use crate::services::geocoding::Geocoder;

/// Resolves raw location strings against the location table.
pub struct LocationResolver {
    locations: LocationRepository,
    geocoder: Arc<dyn Geocoder>,
}

impl LocationResolver {
    pub fn new(locations: LocationRepository, geocoder: Arc<dyn Geocoder>) -> Self {
        Self { locations, geocoder }
    }

    /// Cheap existence check; see [`LocationRepository::exists`].
    pub fn exists(&self, source_id: i64, raw_name: &str) -> repository::Result<bool> {
        self.locations.exists(source_id, raw_name)
    }

    /// A probe handle adapters can use for their detail-fetch short-circuit.
    pub fn probe(&self, source_id: i64) -> SourceLocationProbe {
        SourceLocationProbe {
            locations: self.locations.clone(),
            source_id,
        }
    }

    /// Resolve raw venue text to a location row.
    ///
    /// Existing rows come back untouched - no re-geocoding, no overwriting
    /// of curated fields. A newly created row is geocoded once, unless the
    /// adapter seed already carried coordinates. The second element reports
    /// the geocoding outcome when an attempt was made during this call.
    pub async fn resolve(
        &self,
        source_id: i64,
        raw_name: &str,
        region_hint: &str,
        seed: &LocationSeed,
    ) -> repository::Result<(Location, Option<GeocodingStatus>)> {
        if let Some(existing) = self.locations.find(source_id, raw_name)? {
            return Ok((existing, None));
        }

        let new = NewLocation::from_seed(source_id, raw_name, seed);
        let (location, created) = self.locations.get_or_create(&new)?;
        if !created {
            // Lost a creation race; the winner already handled geocoding.
            return Ok((location, None));
        }

        if seed.has_coordinates() {
            return Ok((location, None));
        }

        let query = build_query(&location.raw_name, region_hint, seed);
        if region_hint.is_empty() && seed.street.is_none() {
            warn!(
                "No geocode region configured for source {}; querying '{}' bare",
                source_id, query
            );
        }

        let outcome = self.geocoder.geocode(&query).await;
        let status = outcome.status();
        self.locations
            .record_geocoding(location.id, status, outcome.coordinates())?;

        let updated = self.locations.get(location.id)?.unwrap_or(location);
        Ok((updated, Some(status)))
    }
}

/// Build the provider query: the venue name plus the best address context
/// available - seed address fields if the adapter found any, otherwise the
/// source's region hint.
fn build_query(raw_name: &str, region_hint: &str, seed: &LocationSeed) -> String {
    if let Some(street) = seed.street.as_deref() {
        let mut query = format!("{raw_name}, {street}");
        if let Some(no) = seed.house_number.as_deref() {
            query.push(' ');
            query.push_str(no);
        }
        let city_part: Vec<&str> = [seed.postal_code.as_deref(), seed.city.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !city_part.is_empty() {
            query.push_str(", ");
            query.push_str(&city_part.join(" "));
        }
        return query;
    }

    if region_hint.is_empty() {
        raw_name.to_string()
    } else {
        format!("{raw_name}, {region_hint}")
    }
}

/// Existence probe bound to one source, handed to adapters.
pub struct SourceLocationProbe {
    locations: LocationRepository,
    source_id: i64,
}

impl LocationProbe for SourceLocationProbe {
    fn location_known(&self, raw_name: &str) -> bool {
        self.locations
            .exists(self.source_id, raw_name)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SourceRepository;
    use crate::services::geocoding::GeocodeOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubGeocoder {
        outcome: GeocodeOutcome,
        calls: AtomicUsize,
    }

    impl StubGeocoder {
        fn new(outcome: GeocodeOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn geocode(&self, _query: &str) -> GeocodeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn setup(
        outcome: GeocodeOutcome,
    ) -> (tempfile::TempDir, LocationResolver, Arc<StubGeocoder>, i64) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        let source = SourceRepository::new(&path)
            .expect("sources")
            .get_or_create("Gemeinde Mulfingen", "https://www.mulfingen.de", "selector")
            .expect("source");
        let geocoder = StubGeocoder::new(outcome);
        let resolver = LocationResolver::new(
            LocationRepository::new(&path).expect("locations"),
            geocoder.clone(),
        );
        (dir, resolver, geocoder, source.id)
    }

    #[tokio::test]
    async fn resolve_is_idempotent_and_geocodes_once() {
        let (_dir, resolver, geocoder, source_id) = setup(GeocodeOutcome::Found {
            latitude: 49.3406,
            longitude: 9.8005,
            formatted_address: None,
        });
        let seed = LocationSeed::default();

        let (first, attempt) = resolver
            .resolve(source_id, "Turnhalle Mulfingen", "74673 Mulfingen", &seed)
            .await
            .expect("first");
        assert_eq!(attempt, Some(GeocodingStatus::Success));
        assert_eq!(first.latitude, Some(49.3406));

        let (second, attempt) = resolver
            .resolve(source_id, "Turnhalle Mulfingen", "74673 Mulfingen", &seed)
            .await
            .expect("second");
        assert_eq!(attempt, None);
        assert_eq!(second.id, first.id);
        assert_eq!(second.geocoding_status, Some(GeocodingStatus::Success));
        assert_eq!(geocoder.call_count(), 1);
    }

    #[tokio::test]
    async fn ambiguous_outcome_stores_no_coordinates() {
        let (_dir, resolver, _geocoder, source_id) =
            setup(GeocodeOutcome::Ambiguous { candidates: 2 });

        let (location, attempt) = resolver
            .resolve(source_id, "Rathaus", "74564 Crailsheim", &LocationSeed::default())
            .await
            .expect("resolve");

        assert_eq!(attempt, Some(GeocodingStatus::Multiple));
        assert_eq!(location.geocoding_status, Some(GeocodingStatus::Multiple));
        assert!(!location.has_coordinates());
    }

    #[tokio::test]
    async fn provider_failure_is_recorded_not_raised() {
        let (_dir, resolver, _geocoder, source_id) = setup(GeocodeOutcome::Failed {
            message: "quota exceeded".to_string(),
        });

        let (location, attempt) = resolver
            .resolve(source_id, "Festhalle", "74673 Mulfingen", &LocationSeed::default())
            .await
            .expect("never raises");

        assert_eq!(attempt, Some(GeocodingStatus::Error));
        assert_eq!(location.geocoding_status, Some(GeocodingStatus::Error));
    }

    #[tokio::test]
    async fn seed_coordinates_suppress_geocoding() {
        let (_dir, resolver, geocoder, source_id) = setup(GeocodeOutcome::NoMatch);
        let seed = LocationSeed {
            latitude: Some(49.1344),
            longitude: Some(10.0706),
            ..Default::default()
        };

        let (location, attempt) = resolver
            .resolve(source_id, "Rathaus Crailsheim", "74564 Crailsheim", &seed)
            .await
            .expect("resolve");

        assert_eq!(attempt, None);
        assert_eq!(geocoder.call_count(), 0);
        assert_eq!(location.latitude, Some(49.1344));
        assert_eq!(location.geocoding_status, None);
    }

    #[tokio::test]
    async fn probe_reports_known_locations() {
        let (_dir, resolver, _geocoder, source_id) = setup(GeocodeOutcome::NoMatch);
        let probe = resolver.probe(source_id);
        assert!(!probe.location_known("Stauseehalle"));

        resolver
            .resolve(source_id, "Stauseehalle", "74673 Mulfingen", &LocationSeed::default())
            .await
            .expect("resolve");
        assert!(probe.location_known("Stauseehalle"));
    }

    #[test]
    fn query_building() {
        let bare = LocationSeed::default();
        assert_eq!(
            build_query("Stauseehalle", "74673 Mulfingen", &bare),
            "Stauseehalle, 74673 Mulfingen"
        );
        assert_eq!(build_query("Stauseehalle", "", &bare), "Stauseehalle");

        let with_address = LocationSeed {
            street: Some("Marktplatz".to_string()),
            house_number: Some("1".to_string()),
            postal_code: Some("74564".to_string()),
            city: Some("Crailsheim".to_string()),
            ..Default::default()
        };
        assert_eq!(
            build_query("Rathaus", "74564 Crailsheim", &with_address),
            "Rathaus, Marktplatz 1, 74564 Crailsheim"
        );
    }
}
