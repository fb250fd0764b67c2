//! Site adapter configuration types.
//!
//! Each municipal site is described by a [`SiteConfig`]: where the event
//! listing lives, how to page through it, and which CSS selectors pick the
//! event fields out of the markup. The selector strings are opaque to the
//! core pipeline; only the adapter interprets them.

use serde::{Deserialize, Serialize};

/// Configuration for one scraped site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Display name, e.g. "Gemeinde Mulfingen".
    pub name: String,
    /// Base URL used for resolving relative links.
    pub base_url: String,
    /// Entry point of the event listing.
    pub events_url: String,
    /// Region hint appended to geocoding queries when no address is known,
    /// e.g. "74673 Mulfingen".
    #[serde(default)]
    pub geocode_region: String,
    /// Regex with one capture group applied to the detail URL to extract
    /// the site's own event id, e.g. `zmdetail_(\d+)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_pattern: Option<String>,
    /// Prefix for external ids built from `id_pattern` captures,
    /// e.g. "crailsheim" yields "crailsheim_12345".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_prefix: Option<String>,
    /// Field selectors applied to each event container.
    #[serde(default)]
    pub selectors: SelectorSet,
    /// Pagination traversal; None means single-page listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationConfig>,
    /// Detail-page enrichment for location data; None skips detail fetches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<DetailConfig>,
}

/// Named extraction targets within one event container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorSet {
    /// Container for a single event entry.
    pub event_container: String,
    pub title: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Anchor carrying the detail page link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// How to find the next listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Candidate selectors for the "next" link, tried in order.
    #[serde(default)]
    pub next_selectors: Vec<String>,
    /// When set, only links whose text equals this value count,
    /// e.g. "Weiter".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_text: Option<String>,
    /// Hard cap on pages per run.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            next_selectors: Vec::new(),
            next_text: None,
            max_pages: default_max_pages(),
        }
    }
}

fn default_max_pages() -> u32 {
    50
}

/// Selectors applied to an event's detail page to harvest location data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Selector for an OpenStreetMap link carrying mlat/mlon parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_toml() {
        let config = SiteConfig {
            name: "Stadt Crailsheim".to_string(),
            base_url: "https://www.crailsheim.de".to_string(),
            events_url: "https://www.crailsheim.de/site/Crailsheim/node/926013/page1/index.html"
                .to_string(),
            geocode_region: "74564 Crailsheim".to_string(),
            selectors: SelectorSet {
                event_container: "div.zmitem.vk-item".to_string(),
                title: "h3 a.titel".to_string(),
                date: "div.zmitem__time".to_string(),
                time: Some("span.dtTimeInfo".to_string()),
                location: None,
                url: Some("h3 a.titel".to_string()),
            },
            pagination: Some(PaginationConfig {
                next_selectors: vec!["ul.pagination li.page-item a.page-link".to_string()],
                next_text: Some("Weiter".to_string()),
                max_pages: 50,
            }),
            detail: None,
            id_pattern: Some(r"zmdetail_(\d+)".to_string()),
            id_prefix: Some("crailsheim".to_string()),
        };

        let serialized = toml::to_string(&config).expect("serialize");
        let parsed: SiteConfig = toml::from_str(&serialized).expect("parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let parsed: SiteConfig = toml::from_str(
            r#"
            name = "Gemeinde Mulfingen"
            base_url = "https://www.mulfingen.de"
            events_url = "https://www.mulfingen.de/veranstaltungen/index.php"

            [selectors]
            event_container = ".event-entry-new-2"
            title = ".event-entry-new-2-headline a"
            date = ".event-entry-new-2-date time"
            "#,
        )
        .expect("parse");

        assert_eq!(parsed.geocode_region, "");
        assert!(parsed.pagination.is_none());
        assert!(parsed.detail.is_none());
        assert!(parsed.selectors.time.is_none());
    }
}
