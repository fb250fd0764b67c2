//! Core pipeline services: normalization, geocoding, location resolution
//! and the per-source run orchestration.

pub mod geocoding;
pub mod normalize;
pub mod resolver;
pub mod runner;

pub use geocoding::{GeocodeOutcome, Geocoder, GoogleGeocoder};
pub use normalize::NormalizeError;
pub use resolver::LocationResolver;
pub use runner::{RunReport, ScrapeRunner};
