//! Location models - normalized venues scoped to a source.
//!
//! Locations are matched by exact raw_name equality within one source and
//! are never deleted; events keep referencing them and orphans stay around
//! for manual curation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Curation workflow status of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    Pending,
    Confirmed,
    Ignored,
}

impl LocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Ignored => "ignored",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "ignored" => Some(Self::Ignored),
            _ => None,
        }
    }
}

/// Outcome of the single geocoding attempt made for a location.
///
/// Ambiguous provider responses get their own `multiple` value so operators
/// can tell them apart from plain misses when disambiguating by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodingStatus {
    Success,
    Multiple,
    NotFound,
    Error,
}

impl GeocodingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Multiple => "multiple",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "multiple" => Some(Self::Multiple),
            "not_found" => Some(Self::NotFound),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A normalized venue, scoped to a source.
///
/// "Stauseehalle" in Mulfingen is not the same location as "Stauseehalle"
/// in Kupferzell; (source_id, raw_name) is the identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Database row ID.
    pub id: i64,
    pub source_id: i64,
    /// Venue name exactly as scraped. Matching key, unique per source.
    pub raw_name: String,
    /// Curated display fields.
    pub display_name: Option<String>,
    pub street: Option<String>,
    pub house_number: Option<String>,
    /// At most 10 characters; longer inputs are discarded upstream.
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// None until a geocoding attempt has been made.
    pub geocoding_status: Option<GeocodingStatus>,
    pub status: LocationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    /// Formatted full address from curated fields, if a street is known.
    pub fn full_address(&self) -> Option<String> {
        let street = self.street.as_deref()?;

        let mut parts = Vec::new();
        match &self.house_number {
            Some(no) => parts.push(format!("{street} {no}")),
            None => parts.push(street.to_string()),
        }

        let city_part: Vec<&str> = [self.postal_code.as_deref(), self.city.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !city_part.is_empty() {
            parts.push(city_part.join(" "));
        }

        if self.country != "Deutschland" {
            parts.push(self.country.clone());
        }

        Some(parts.join(", "))
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Address data an adapter harvested alongside an event, typically from a
/// detail page. Used only when the location is first created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationSeed {
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl LocationSeed {
    /// Seed coordinates make the geocoding call unnecessary.
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Insert payload for a location row.
#[derive(Debug, Clone)]
pub struct NewLocation {
    pub source_id: i64,
    pub raw_name: String,
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl NewLocation {
    /// Build an insert payload from a raw name and an adapter seed.
    pub fn from_seed(source_id: i64, raw_name: &str, seed: &LocationSeed) -> Self {
        Self {
            source_id,
            raw_name: raw_name.trim().to_string(),
            street: seed.street.clone(),
            house_number: seed.house_number.clone(),
            postal_code: seed.postal_code.clone(),
            city: seed.city.clone(),
            latitude: seed.latitude,
            longitude: seed.longitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn location() -> Location {
        Location {
            id: 1,
            source_id: 1,
            raw_name: "Stauseehalle".to_string(),
            display_name: None,
            street: Some("Hauptstraße".to_string()),
            house_number: Some("12".to_string()),
            postal_code: Some("74673".to_string()),
            city: Some("Mulfingen".to_string()),
            country: "Deutschland".to_string(),
            latitude: None,
            longitude: None,
            geocoding_status: None,
            status: LocationStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn full_address_with_all_fields() {
        assert_eq!(
            location().full_address().as_deref(),
            Some("Hauptstraße 12, 74673 Mulfingen")
        );
    }

    #[test]
    fn full_address_requires_street() {
        let mut loc = location();
        loc.street = None;
        assert_eq!(loc.full_address(), None);
    }

    #[test]
    fn full_address_appends_foreign_country() {
        let mut loc = location();
        loc.country = "Österreich".to_string();
        assert_eq!(
            loc.full_address().as_deref(),
            Some("Hauptstraße 12, 74673 Mulfingen, Österreich")
        );
    }

    #[test]
    fn status_round_trip() {
        for s in [
            LocationStatus::Pending,
            LocationStatus::Confirmed,
            LocationStatus::Ignored,
        ] {
            assert_eq!(LocationStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(LocationStatus::from_str("bogus"), None);
    }

    #[test]
    fn geocoding_status_round_trip() {
        for s in [
            GeocodingStatus::Success,
            GeocodingStatus::Multiple,
            GeocodingStatus::NotFound,
            GeocodingStatus::Error,
        ] {
            assert_eq!(GeocodingStatus::from_str(s.as_str()), Some(s));
        }
    }
}
