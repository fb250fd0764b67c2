//! Data models for muniscrape.

mod event;
mod location;
mod scrape_log;
mod source;

pub use event::{Event, EventDraft};
pub use location::{GeocodingStatus, Location, LocationSeed, LocationStatus, NewLocation};
pub use scrape_log::{GeocodingStats, RunStats, ScrapeLog, ScrapeStatus};
pub use source::Source;
