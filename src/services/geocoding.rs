//! Geocoding collaborator.
//!
//! The provider is consumed as a black box: query string in, one of four
//! outcomes out. Outcomes are plain data - geocoding never raises, so a
//! quota problem or a flaky network can never take a scrape run down.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::models::GeocodingStatus;

/// Result of one geocoding attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    /// Exactly one match.
    Found {
        latitude: f64,
        longitude: f64,
        formatted_address: Option<String>,
    },
    /// More than one candidate; needs manual disambiguation.
    Ambiguous { candidates: usize },
    /// Provider answered but knows no such place.
    NoMatch,
    /// Provider unreachable, quota exceeded, or similar.
    Failed { message: String },
}

impl GeocodeOutcome {
    /// The status value stored on the location for this outcome.
    pub fn status(&self) -> GeocodingStatus {
        match self {
            Self::Found { .. } => GeocodingStatus::Success,
            Self::Ambiguous { .. } => GeocodingStatus::Multiple,
            Self::NoMatch => GeocodingStatus::NotFound,
            Self::Failed { .. } => GeocodingStatus::Error,
        }
    }

    /// Coordinates to store; only unambiguous hits carry any.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match self {
            Self::Found {
                latitude,
                longitude,
                ..
            } => Some((*latitude, *longitude)),
            _ => None,
        }
    }
}

/// Address-to-coordinates collaborator interface.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> GeocodeOutcome;
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleResult {
    geometry: GoogleGeometry,
    formatted_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleGeometry {
    location: GoogleLatLng,
}

#[derive(Debug, Deserialize)]
struct GoogleLatLng {
    lat: f64,
    lng: f64,
}

/// Google Maps Geocoding API client.
pub struct GoogleGeocoder {
    client: Client,
    api_key: String,
    /// Log the query instead of calling the API; reports a fake success.
    dry_run: bool,
}

const API_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

impl GoogleGeocoder {
    pub fn new(api_key: String, timeout: Duration, dry_run: bool) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            api_key,
            dry_run,
        }
    }

    async fn request(&self, query: &str) -> Result<GoogleResponse, reqwest::Error> {
        self.client
            .get(API_URL)
            .query(&[
                ("address", query),
                ("key", self.api_key.as_str()),
                ("language", "de"),
                ("region", "de"),
            ])
            .send()
            .await?
            .json()
            .await
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, query: &str) -> GeocodeOutcome {
        if self.dry_run {
            info!("[dry-run] would geocode: '{}'", query);
            return GeocodeOutcome::Found {
                latitude: 0.0,
                longitude: 0.0,
                formatted_address: Some(format!("[dry-run] {query}")),
            };
        }

        let response = match self.request(query).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Geocoding request failed for '{}': {}", query, e);
                return GeocodeOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };

        match response.status.as_str() {
            "OK" => match response.results.as_slice() {
                [] => GeocodeOutcome::NoMatch,
                [only] => {
                    info!(
                        "Geocoded '{}' -> {}, {}",
                        query, only.geometry.location.lat, only.geometry.location.lng
                    );
                    GeocodeOutcome::Found {
                        latitude: only.geometry.location.lat,
                        longitude: only.geometry.location.lng,
                        formatted_address: only.formatted_address.clone(),
                    }
                }
                many => {
                    warn!(
                        "Geocoding ambiguous for '{}': {} candidates",
                        query,
                        many.len()
                    );
                    GeocodeOutcome::Ambiguous {
                        candidates: many.len(),
                    }
                }
            },
            "ZERO_RESULTS" => {
                info!("No geocoding results for '{}'", query);
                GeocodeOutcome::NoMatch
            }
            other => {
                // OVER_QUERY_LIMIT, REQUEST_DENIED, INVALID_REQUEST, ...
                let message = response
                    .error_message
                    .unwrap_or_else(|| other.to_string());
                warn!("Geocoding API error for '{}': {}", query, message);
                GeocodeOutcome::Failed { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_maps_to_stored_status() {
        let found = GeocodeOutcome::Found {
            latitude: 49.34,
            longitude: 9.8,
            formatted_address: None,
        };
        assert_eq!(found.status(), GeocodingStatus::Success);
        assert_eq!(found.coordinates(), Some((49.34, 9.8)));

        let ambiguous = GeocodeOutcome::Ambiguous { candidates: 2 };
        assert_eq!(ambiguous.status(), GeocodingStatus::Multiple);
        assert_eq!(ambiguous.coordinates(), None);

        assert_eq!(GeocodeOutcome::NoMatch.status(), GeocodingStatus::NotFound);
        let failed = GeocodeOutcome::Failed {
            message: "quota".to_string(),
        };
        assert_eq!(failed.status(), GeocodingStatus::Error);
        assert_eq!(failed.coordinates(), None);
    }

    #[tokio::test]
    async fn dry_run_skips_the_api() {
        let geocoder = GoogleGeocoder::new(String::new(), Duration::from_secs(10), true);
        let outcome = geocoder.geocode("Stauseehalle, 74673 Mulfingen").await;
        assert_eq!(outcome.status(), GeocodingStatus::Success);
    }

    #[test]
    fn provider_response_parsing() {
        let body = r#"{
            "status": "OK",
            "results": [{
                "geometry": {"location": {"lat": 49.3406, "lng": 9.8005}},
                "formatted_address": "Stauseehalle, 74673 Mulfingen"
            }]
        }"#;
        let parsed: GoogleResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.status, "OK");
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].geometry.location.lat, 49.3406);

        let error = r#"{"status": "OVER_QUERY_LIMIT", "error_message": "quota exceeded"}"#;
        let parsed: GoogleResponse = serde_json::from_str(error).expect("parse");
        assert!(parsed.results.is_empty());
        assert_eq!(parsed.error_message.as_deref(), Some("quota exceeded"));
    }
}
