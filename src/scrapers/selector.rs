//! Selector-driven site adapter.
//!
//! Interprets a [`SiteConfig`]: walks the event listing (following the
//! configured pagination link until exhausted), picks event fields out of
//! each container element, and optionally enriches events with location
//! data from their detail pages.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use async_trait::async_trait;

use super::{FetchError, Fetcher, LocationProbe, RawEvent, SiteAdapter, SiteConfig};

/// Generic scraper configured entirely through [`SiteConfig`].
pub struct SelectorScraper {
    config: SiteConfig,
}

/// Location fields harvested from a detail page.
#[derive(Debug, Default, PartialEq)]
struct DetailData {
    raw_location: Option<String>,
    street: Option<String>,
    postal_code: Option<String>,
    city: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

fn select_text(element: &ElementRef, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let text: String = element.select(&sel).next()?.text().collect();
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn select_attr(element: &ElementRef, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    element
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|s| s.to_string())
}

impl SelectorScraper {
    pub fn new(config: SiteConfig) -> Self {
        Self { config }
    }

    /// Parse one listing page: events plus the next page URL, if any.
    fn parse_listing(&self, html: &str) -> Result<(Vec<RawEvent>, Option<String>), FetchError> {
        let document = Fetcher::parse(html);
        let container_sel = Selector::parse(&self.config.selectors.event_container)
            .map_err(|_| {
                FetchError::Adapter(format!(
                    "invalid event_container selector: {}",
                    self.config.selectors.event_container
                ))
            })?;

        let mut events = Vec::new();
        for container in document.select(&container_sel) {
            if let Some(event) = self.parse_container(&container) {
                events.push(event);
            }
        }

        let next = self.find_next_page(&document);
        Ok((events, next))
    }

    fn parse_container(&self, container: &ElementRef) -> Option<RawEvent> {
        let selectors = &self.config.selectors;

        let title = select_text(container, &selectors.title)?;
        let date = select_text(container, &selectors.date)?;

        let time = selectors
            .time
            .as_deref()
            .and_then(|sel| select_text(container, sel));
        let raw_location = selectors
            .location
            .as_deref()
            .and_then(|sel| select_text(container, sel));

        let url = selectors
            .url
            .as_deref()
            .and_then(|sel| select_attr(container, sel, "href"))
            .and_then(|href| Fetcher::resolve(&self.config.base_url, &href).ok());

        let external_id = url.as_deref().and_then(|u| self.extract_site_id(u));

        Some(RawEvent {
            external_id,
            title,
            date,
            time,
            url,
            raw_location,
            ..Default::default()
        })
    }

    /// Apply the configured id pattern to a detail URL, prefixing the
    /// capture with the site's id prefix.
    fn extract_site_id(&self, url: &str) -> Option<String> {
        let pattern = self.config.id_pattern.as_deref()?;
        let re = Regex::new(pattern).ok()?;
        let captured = re.captures(url)?.get(1)?.as_str();
        match self.config.id_prefix.as_deref() {
            Some(prefix) => Some(format!("{prefix}_{captured}")),
            None => Some(captured.to_string()),
        }
    }

    /// Find the next listing page via the configured pagination selectors.
    fn find_next_page(&self, document: &Html) -> Option<String> {
        let pagination = self.config.pagination.as_ref()?;

        for selector_str in &pagination.next_selectors {
            let Ok(sel) = Selector::parse(selector_str) else {
                continue;
            };
            for element in document.select(&sel) {
                if let Some(expected) = pagination.next_text.as_deref() {
                    let text: String = element.text().collect();
                    if text.trim() != expected {
                        continue;
                    }
                }
                if let Some(href) = element.value().attr("href") {
                    if let Ok(url) = Fetcher::resolve(&self.config.base_url, href) {
                        return Some(url);
                    }
                }
            }
        }

        None
    }

    /// Parse the configured detail-page selectors out of detail markup.
    fn parse_detail(&self, html: &str) -> DetailData {
        let Some(detail) = self.config.detail.as_ref() else {
            return DetailData::default();
        };
        let document = Fetcher::parse(html);
        let root = document.root_element();

        let mut data = DetailData {
            raw_location: detail
                .location
                .as_deref()
                .and_then(|sel| select_text(&root, sel)),
            street: detail
                .street
                .as_deref()
                .and_then(|sel| select_text(&root, sel)),
            postal_code: detail
                .postal_code
                .as_deref()
                .and_then(|sel| select_text(&root, sel)),
            city: detail.city.as_deref().and_then(|sel| select_text(&root, sel)),
            ..Default::default()
        };

        // Coordinates from an OpenStreetMap link (mlat/mlon parameters).
        if let Some(link_sel) = detail.coordinates_link.as_deref() {
            if let Some(href) = select_attr(&root, link_sel, "href") {
                data.latitude = extract_param(&href, "mlat");
                data.longitude = extract_param(&href, "mlon");
            }
        }

        data
    }

    /// Fetch the detail page for an event and merge its location data.
    /// Detail failures are logged and skipped; they never abort a run.
    async fn enrich_from_detail(
        &self,
        fetcher: &Fetcher,
        known_locations: &dyn LocationProbe,
        event: &mut RawEvent,
    ) {
        if self.config.detail.is_none() {
            return;
        }
        let Some(url) = event.url.clone() else {
            return;
        };

        // Venue already on file: the detail fetch would buy nothing.
        if let Some(name) = event.raw_location.as_deref() {
            if known_locations.location_known(name) {
                debug!("Skipping detail fetch for known location '{}'", name);
                return;
            }
        }

        let html = match fetcher.get_text(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Detail page fetch failed: {} - {}", url, e);
                return;
            }
        };

        let data = self.parse_detail(&html);
        if event.raw_location.is_none() {
            event.raw_location = data.raw_location;
        }
        event.street = data.street;
        event.postal_code = data.postal_code;
        event.city = data.city;
        event.latitude = data.latitude;
        event.longitude = data.longitude;
    }
}

/// Extract a float query parameter from a URL-ish string.
fn extract_param(href: &str, name: &str) -> Option<f64> {
    let re = Regex::new(&format!(r"{name}=([0-9.]+)")).ok()?;
    re.captures(href)?.get(1)?.as_str().parse().ok()
}

#[async_trait]
impl SiteAdapter for SelectorScraper {
    fn config(&self) -> &SiteConfig {
        &self.config
    }

    async fn produce_raw_events(
        &self,
        fetcher: &Fetcher,
        known_locations: &dyn LocationProbe,
    ) -> Result<Vec<RawEvent>, FetchError> {
        let mut events = Vec::new();
        let mut page_url = self.config.events_url.clone();
        let max_pages = self
            .config
            .pagination
            .as_ref()
            .map(|p| p.max_pages)
            .unwrap_or(1);
        let mut page = 0;

        loop {
            page += 1;
            debug!("{}: parsing page {}", self.config.name, page);
            let html = fetcher.get_text(&page_url).await?;
            let (mut page_events, next) = self.parse_listing(&html)?;

            for event in &mut page_events {
                self.enrich_from_detail(fetcher, known_locations, event).await;
            }
            events.extend(page_events);

            match next {
                Some(next_url) if page < max_pages && next_url != page_url => page_url = next_url,
                _ => break,
            }
        }

        info!(
            "{}: {} raw events from {} page(s)",
            self.config.name,
            events.len(),
            page
        );
        Ok(events)
    }
}
