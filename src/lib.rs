//! muniscrape - municipal event aggregation and scraping system.
//!
//! Ingests event listings from independently structured municipal websites,
//! normalizes them into a shared schema, and reconciles venue references
//! against a growing location table, including geocoding.

pub mod cli;
pub mod config;
pub mod models;
pub mod repository;
pub mod scrapers;
pub mod services;
