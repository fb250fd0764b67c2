//! Event normalizer.
//!
//! Converts a raw scraped record into the canonical [`EventDraft`] shape:
//! German textual date/time formats become calendar types, combined postal
//! strings are split, and a stable external id is guaranteed - either taken
//! from the adapter or derived from the detail URL.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{EventDraft, LocationSeed};
use crate::scrapers::RawEvent;

/// Longest postal code we store; anything above is treated as absent.
pub const MAX_POSTAL_CODE_LEN: usize = 10;

/// Validation failures that drop a single event from the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("event has no title")]
    MissingTitle,
    #[error("unparseable event date: {0:?}")]
    BadDate(String),
    #[error("no external id and no detail url to derive one from")]
    MissingExternalId,
}

fn numeric_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4})").expect("valid regex"))
}

fn named_month_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,2})\.?\s+([a-zäöü]+)\.?\s+(\d{4})").expect("valid regex")
    })
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid regex"))
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2})[:.](\d{2})").expect("valid regex"))
}

fn postal_city_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4,5})\s+(.+)$").expect("valid regex"))
}

/// German month names and their common abbreviations.
fn month_number(name: &str) -> Option<u32> {
    match name.to_lowercase().as_str() {
        "jan" | "januar" => Some(1),
        "feb" | "februar" => Some(2),
        "mär" | "märz" | "mar" | "maerz" => Some(3),
        "apr" | "april" => Some(4),
        "mai" => Some(5),
        "jun" | "juni" => Some(6),
        "jul" | "juli" => Some(7),
        "aug" | "august" => Some(8),
        "sep" | "sept" | "september" => Some(9),
        "okt" | "oktober" => Some(10),
        "nov" | "november" => Some(11),
        "dez" | "dezember" => Some(12),
        _ => None,
    }
}

/// Parse a date out of site-format text.
///
/// Accepts "04.02.2026" (anywhere in the string, so weekday prefixes like
/// "Montag, 09.02.2026" work), "04. Feb 2026" with German month names, and
/// ISO "2026-02-04".
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();

    if let Some(caps) = numeric_date_re().captures(text) {
        let day = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let year = caps.get(3)?.as_str().parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = iso_date_re().captures(text) {
        let year = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let day = caps.get(3)?.as_str().parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = named_month_date_re().captures(text) {
        let day = caps.get(1)?.as_str().parse().ok()?;
        let month = month_number(caps.get(2)?.as_str())?;
        let year = caps.get(3)?.as_str().parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// Parse a clock time out of site-format text.
///
/// Accepts "18:00", "18:00 Uhr" and the dot variant "18.30 Uhr".
pub fn parse_time_text(text: &str) -> Option<NaiveTime> {
    let caps = time_re().captures(text.trim())?;
    let hour = caps.get(1)?.as_str().parse().ok()?;
    let minute = caps.get(2)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Split a combined "74564 Crailsheim" string into postal code and city.
///
/// Returns (postal_code, city); inputs that are not a leading postal code
/// come back as (None, None) so callers can keep their original values.
pub fn split_postal_city(text: &str) -> (Option<String>, Option<String>) {
    match postal_city_re().captures(text.trim()) {
        Some(caps) => {
            let code = caps.get(1).map(|m| m.as_str().to_string());
            let city = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|c| !c.is_empty());
            (code, city)
        }
        None => (None, None),
    }
}

/// Clamp a postal code to the storable bound. Overlong or empty values are
/// treated as missing, not as an error.
fn sanitize_postal_code(code: Option<String>) -> Option<String> {
    code.map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && c.len() <= MAX_POSTAL_CODE_LEN)
}

/// Derive a stable external id from a detail URL.
///
/// Same URL in, same id out, across runs - the hash only has to be unique
/// within one source.
pub fn derive_external_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("url_{}", &digest[..16])
}

/// Normalize a raw scraped record into an event draft.
pub fn normalize(raw: &RawEvent) -> Result<EventDraft, NormalizeError> {
    let title = raw.title.trim();
    if title.is_empty() {
        return Err(NormalizeError::MissingTitle);
    }

    let event_date =
        parse_date_text(&raw.date).ok_or_else(|| NormalizeError::BadDate(raw.date.clone()))?;
    let event_time = raw.time.as_deref().and_then(parse_time_text);
    let event_end_date = raw.end_date.as_deref().and_then(parse_date_text);
    let event_end_time = raw.end_time.as_deref().and_then(parse_time_text);

    let external_id = match raw.external_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => match raw.url.as_deref() {
            Some(url) => derive_external_id(url),
            None => return Err(NormalizeError::MissingExternalId),
        },
    };

    // Postal codes sometimes arrive combined with the city name.
    let (mut postal_code, mut city) = (raw.postal_code.clone(), raw.city.clone());
    if let Some(code) = postal_code.as_deref() {
        let (split_code, split_city) = split_postal_city(code);
        if split_code.is_some() {
            postal_code = split_code;
            if city.is_none() {
                city = split_city;
            }
        }
    }

    let raw_location = raw
        .raw_location
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(EventDraft {
        external_id,
        title: title.to_string(),
        event_date,
        event_time,
        event_end_date,
        event_end_time,
        url: raw.url.clone(),
        raw_location,
        location_seed: LocationSeed {
            street: raw.street.clone(),
            house_number: raw.house_number.clone(),
            postal_code: sanitize_postal_code(postal_code),
            city,
            latitude: raw.latitude,
            longitude: raw.longitude,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_german_listing_entry() {
        let raw = RawEvent {
            external_id: Some("mulfingen_77".to_string()),
            title: "Dorffest".to_string(),
            date: "04.02.2026".to_string(),
            time: Some("18:00 Uhr".to_string()),
            raw_location: Some("Turnhalle Mulfingen".to_string()),
            ..Default::default()
        };

        let draft = normalize(&raw).expect("valid");
        assert_eq!(draft.event_date, NaiveDate::from_ymd_opt(2026, 2, 4).expect("date"));
        assert_eq!(draft.event_time, NaiveTime::from_hms_opt(18, 0, 0));
        assert_eq!(draft.raw_location.as_deref(), Some("Turnhalle Mulfingen"));
        assert_eq!(draft.external_id, "mulfingen_77");
    }

    #[test]
    fn date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 2, 9);
        assert_eq!(parse_date_text("Montag, 09.02.2026"), expected);
        assert_eq!(parse_date_text("9.2.2026"), expected);
        assert_eq!(parse_date_text("2026-02-09"), expected);
        assert_eq!(parse_date_text("09. Feb 2026"), expected);
        assert_eq!(parse_date_text("9. Februar 2026"), expected);
        assert_eq!(parse_date_text("irgendwann"), None);
        assert_eq!(parse_date_text("32.01.2026"), None);
    }

    #[test]
    fn time_formats() {
        let expected = NaiveTime::from_hms_opt(18, 30, 0);
        assert_eq!(parse_time_text("18:30 Uhr"), expected);
        assert_eq!(parse_time_text("18.30 Uhr"), expected);
        assert_eq!(parse_time_text("18:30"), expected);
        assert_eq!(parse_time_text("Beginn 18:30"), expected);
        assert_eq!(parse_time_text("25:30"), None);
        assert_eq!(parse_time_text("offen"), None);
    }

    #[test]
    fn postal_city_splitting() {
        assert_eq!(
            split_postal_city("74564 Crailsheim"),
            (Some("74564".to_string()), Some("Crailsheim".to_string()))
        );
        assert_eq!(
            split_postal_city("74564  Schwäbisch Hall"),
            (
                Some("74564".to_string()),
                Some("Schwäbisch Hall".to_string())
            )
        );
        assert_eq!(split_postal_city("Crailsheim"), (None, None));
    }

    #[test]
    fn combined_postal_is_split_during_normalization() {
        let raw = RawEvent {
            external_id: Some("x".to_string()),
            title: "Konzert".to_string(),
            date: "04.02.2026".to_string(),
            postal_code: Some("74564 Crailsheim".to_string()),
            ..Default::default()
        };

        let draft = normalize(&raw).expect("valid");
        assert_eq!(draft.location_seed.postal_code.as_deref(), Some("74564"));
        assert_eq!(draft.location_seed.city.as_deref(), Some("Crailsheim"));
    }

    #[test]
    fn overlong_postal_code_becomes_null() {
        let raw = RawEvent {
            external_id: Some("x".to_string()),
            title: "Konzert".to_string(),
            date: "04.02.2026".to_string(),
            postal_code: Some("not-a-postal-code-at-all".to_string()),
            city: Some("Crailsheim".to_string()),
            ..Default::default()
        };

        let draft = normalize(&raw).expect("still valid");
        assert_eq!(draft.location_seed.postal_code, None);
        assert_eq!(draft.location_seed.city.as_deref(), Some("Crailsheim"));
    }

    #[test]
    fn external_id_derived_from_url_is_stable() {
        let raw = RawEvent {
            title: "Konzert".to_string(),
            date: "04.02.2026".to_string(),
            url: Some("https://www.crailsheim.de/zmdetail_555.html".to_string()),
            ..Default::default()
        };

        let a = normalize(&raw).expect("valid");
        let b = normalize(&raw).expect("valid");
        assert_eq!(a.external_id, b.external_id);
        assert!(a.external_id.starts_with("url_"));

        let other = RawEvent {
            url: Some("https://www.crailsheim.de/zmdetail_556.html".to_string()),
            ..raw
        };
        assert_ne!(normalize(&other).expect("valid").external_id, a.external_id);
    }

    #[test]
    fn validation_failures() {
        let no_title = RawEvent {
            external_id: Some("x".to_string()),
            date: "04.02.2026".to_string(),
            ..Default::default()
        };
        assert_eq!(normalize(&no_title), Err(NormalizeError::MissingTitle));

        let bad_date = RawEvent {
            external_id: Some("x".to_string()),
            title: "Konzert".to_string(),
            date: "demnächst".to_string(),
            ..Default::default()
        };
        assert_eq!(
            normalize(&bad_date),
            Err(NormalizeError::BadDate("demnächst".to_string()))
        );

        let no_id = RawEvent {
            title: "Konzert".to_string(),
            date: "04.02.2026".to_string(),
            ..Default::default()
        };
        assert_eq!(normalize(&no_id), Err(NormalizeError::MissingExternalId));
    }

    #[test]
    fn missing_time_and_location_are_not_errors() {
        let raw = RawEvent {
            external_id: Some("x".to_string()),
            title: "Konzert".to_string(),
            date: "04.02.2026".to_string(),
            time: Some("nach Absprache".to_string()),
            ..Default::default()
        };

        let draft = normalize(&raw).expect("valid");
        assert_eq!(draft.event_time, None);
        assert_eq!(draft.raw_location, None);
    }
}
