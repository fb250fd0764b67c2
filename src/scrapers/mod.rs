//! Site adapters for municipal event sources.
//!
//! Every adapter fulfills the same narrow contract: given a fetcher, yield
//! the raw event records of its site. Normalization, location matching and
//! persistence all happen downstream in the shared pipeline - adapters never
//! touch the database themselves.

pub mod config;
mod http_client;
pub mod rate_limiter;
pub mod selector;

pub use config::{DetailConfig, PaginationConfig, SelectorSet, SiteConfig};
pub use http_client::{FetchError, Fetcher};
pub use rate_limiter::RateLimiter;
pub use selector::SelectorScraper;

use std::collections::BTreeMap;

use async_trait::async_trait;

/// An event record exactly as scraped, before normalization.
///
/// Date and time are kept as site-format text; the normalizer owns the
/// conversion to calendar types. Address fields are optional enrichment
/// from detail pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    /// Site-provided id. When None, the normalizer derives one from `url`.
    pub external_id: Option<String>,
    pub title: String,
    /// Date text, e.g. "Montag, 09.02.2026".
    pub date: String,
    /// Time text, e.g. "18:00 Uhr".
    pub time: Option<String>,
    pub end_date: Option<String>,
    pub end_time: Option<String>,
    /// Absolute detail page URL.
    pub url: Option<String>,
    /// Venue text, the location-matching seed.
    pub raw_location: Option<String>,
    pub street: Option<String>,
    pub house_number: Option<String>,
    /// May be a combined string like "74564 Crailsheim".
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Read-only probe an adapter may consult to skip expensive detail-page
/// fetches for venues that are already on file. Purely an optimization;
/// adapters remain correct if they ignore it.
pub trait LocationProbe: Send + Sync {
    fn location_known(&self, raw_name: &str) -> bool;
}

/// No-op probe: every location counts as unknown.
pub struct NoLocationProbe;

impl LocationProbe for NoLocationProbe {
    fn location_known(&self, _raw_name: &str) -> bool {
        false
    }
}

/// The capability every site adapter implements.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Static configuration of the scraped site.
    fn config(&self) -> &SiteConfig;

    /// Produce the raw events of one full scrape of the site.
    ///
    /// Finite; restartable only by calling again from scratch. Owns
    /// pagination traversal and any detail-page fetches.
    async fn produce_raw_events(
        &self,
        fetcher: &Fetcher,
        known_locations: &dyn LocationProbe,
    ) -> Result<Vec<RawEvent>, FetchError>;
}

/// Build the immutable registry of configured sites, keyed by short name.
///
/// Assembled once at startup; CLI and scheduler commands look sites up here.
pub fn builtin_sites() -> BTreeMap<String, SiteConfig> {
    let mut sites = BTreeMap::new();

    sites.insert(
        "mulfingen".to_string(),
        SiteConfig {
            name: "Gemeinde Mulfingen".to_string(),
            base_url: "https://www.mulfingen.de".to_string(),
            events_url: "https://www.mulfingen.de/veranstaltungen/index.php".to_string(),
            geocode_region: "74673 Mulfingen".to_string(),
            selectors: SelectorSet {
                event_container: ".event-entry-new-2".to_string(),
                title: ".event-entry-new-2-headline a".to_string(),
                date: ".event-entry-new-2-date time".to_string(),
                time: Some(".event-entry-new-2-daytime time".to_string()),
                location: Some(".event-entry-new-2-location".to_string()),
                url: Some(".event-entry-new-2-headline a".to_string()),
            },
            pagination: None,
            detail: None,
            id_pattern: None,
            id_prefix: Some("mulfingen".to_string()),
        },
    );

    sites.insert(
        "kuenzelsau".to_string(),
        SiteConfig {
            name: "Stadt Künzelsau".to_string(),
            base_url: "https://kuenzelsau.de".to_string(),
            events_url: "https://kuenzelsau.de/freizeit+und+kultur/veranstaltungen".to_string(),
            geocode_region: "74653 Künzelsau".to_string(),
            selectors: SelectorSet {
                event_container: "article.zmitem".to_string(),
                title: "h3.titelzmtitel".to_string(),
                date: "span.dtstart".to_string(),
                time: Some("span.dtTimeInfo".to_string()),
                location: Some(".zmOrt .organization".to_string()),
                url: Some("footer a.details".to_string()),
            },
            pagination: None,
            detail: None,
            id_pattern: None,
            id_prefix: Some("kuenzelsau".to_string()),
        },
    );

    sites.insert(
        "crailsheim".to_string(),
        SiteConfig {
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
                next_selectors: vec![
                    "ul.zmNavigClassInnen.pagination li.page-item a.page-link".to_string(),
                ],
                next_text: Some("Weiter".to_string()),
                max_pages: 50,
            }),
            detail: Some(DetailConfig {
                location: Some("div.vCard div.organization".to_string()),
                street: Some("div.vCard div.street-address".to_string()),
                postal_code: Some("div.vCard span.postal-code".to_string()),
                city: Some("div.vCard span.locality".to_string()),
                coordinates_link: Some("div.vCard a[href*=\"openstreetmap.org\"]".to_string()),
            }),
            id_pattern: Some(r"zmdetail_(\d+)".to_string()),
            id_prefix: Some("crailsheim".to_string()),
        },
    );

    sites
}

/// Instantiate the adapter for a site config.
pub fn build_adapter(config: SiteConfig) -> Box<dyn SiteAdapter> {
    Box::new(SelectorScraper::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_is_consistent() {
        let sites = builtin_sites();
        assert!(sites.contains_key("mulfingen"));
        assert!(sites.contains_key("crailsheim"));

        for (key, config) in &sites {
            assert!(!config.name.is_empty(), "{key}: missing name");
            assert!(config.base_url.starts_with("https://"), "{key}: base_url");
            assert!(
                config.events_url.starts_with(&config.base_url),
                "{key}: events_url outside base_url"
            );
            assert!(!config.selectors.event_container.is_empty(), "{key}: container");
            assert!(!config.geocode_region.is_empty(), "{key}: region hint");
        }
    }
}
