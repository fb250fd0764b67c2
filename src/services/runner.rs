//! Scrape run pipeline.
//!
//! Orchestrates one full run against one source: open a log row, let the
//! adapter produce raw events, push each through normalization and location
//! resolution, upsert into the event table, soft-delete what vanished, and
//! finalize the log. Sources are isolated from each other - a failing
//! adapter marks its own run failed and nothing else.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::models::{RunStats, ScrapeStatus};
use crate::repository::{
    self, EventRepository, LocationRepository, ScrapeLogRepository, SourceRepository,
    UpsertOutcome,
};
use crate::scrapers::{Fetcher, SiteAdapter};
use crate::services::geocoding::Geocoder;
use crate::services::normalize;
use crate::services::resolver::LocationResolver;

/// Outcome of one run, for callers that want to print summaries.
#[derive(Debug)]
pub struct RunReport {
    pub source_name: String,
    /// None when the run died before a log row could be opened.
    pub log_id: Option<i64>,
    pub status: ScrapeStatus,
    pub stats: RunStats,
    pub error: Option<String>,
}

/// Runs the ingestion pipeline for configured sites.
pub struct ScrapeRunner {
    sources: SourceRepository,
    events: EventRepository,
    logs: ScrapeLogRepository,
    resolver: LocationResolver,
    fetcher: Fetcher,
}

impl ScrapeRunner {
    pub fn new(settings: &Settings, geocoder: Arc<dyn Geocoder>) -> repository::Result<Self> {
        let db = settings.database_path.as_path();
        Ok(Self {
            sources: SourceRepository::new(db)?,
            events: EventRepository::new(db)?,
            logs: ScrapeLogRepository::new(db)?,
            resolver: LocationResolver::new(LocationRepository::new(db)?, geocoder),
            fetcher: Fetcher::new(
                &settings.user_agent,
                settings.request_timeout(),
                settings.request_delay(),
                settings.max_retries,
            ),
        })
    }

    /// Run the full pipeline for one site.
    ///
    /// Adapter and fetch failures finalize the log as failed and are
    /// reported, not returned as errors; only database trouble bubbles up
    /// (leaving the log at `running`, the accepted crash signature).
    pub async fn run_site(&self, adapter: &dyn SiteAdapter) -> repository::Result<RunReport> {
        let config = adapter.config();
        let source = self
            .sources
            .get_or_create(&config.name, &config.base_url, "selector")?;
        let log = self.logs.open(source.id)?;
        let run_started_at = log.started_at;
        info!("Starting scrape run {} for {}", log.id, config.name);

        let probe = self.resolver.probe(source.id);
        let raw_events = match adapter.produce_raw_events(&self.fetcher, &probe).await {
            Ok(events) => events,
            Err(e) => {
                error!("{}: adapter failed: {}", config.name, e);
                let stats = RunStats::default();
                self.logs.finish_failed(log.id, &stats, &e.to_string())?;
                self.sources.update_last_scraped(source.id, Utc::now())?;
                return Ok(RunReport {
                    source_name: config.name.clone(),
                    log_id: Some(log.id),
                    status: ScrapeStatus::Failed,
                    stats,
                    error: Some(e.to_string()),
                });
            }
        };

        let mut stats = RunStats {
            events_found: raw_events.len() as u64,
            ..Default::default()
        };
        let mut seen: HashSet<String> = HashSet::new();

        for raw in &raw_events {
            let draft = match normalize::normalize(raw) {
                Ok(draft) => draft,
                Err(e) => {
                    warn!("{}: dropping event: {}", config.name, e);
                    stats.events_skipped += 1;
                    continue;
                }
            };

            if !seen.insert(draft.external_id.clone()) {
                warn!(
                    "{}: duplicate external id '{}' within run, skipping",
                    config.name, draft.external_id
                );
                stats.events_skipped += 1;
                continue;
            }

            let location_id = match draft.raw_location.as_deref() {
                Some(raw_name) => {
                    let (location, attempt) = self
                        .resolver
                        .resolve(source.id, raw_name, &config.geocode_region, &draft.location_seed)
                        .await?;
                    if let Some(status) = attempt {
                        stats.geocoding.record(status);
                    }
                    Some(location.id)
                }
                None => {
                    warn!(
                        "{}: event '{}' has no location, not map-displayable",
                        config.name, draft.title
                    );
                    stats.not_mappable += 1;
                    None
                }
            };

            match self.events.upsert(source.id, location_id, &draft)? {
                UpsertOutcome::Created => stats.events_new += 1,
                UpsertOutcome::Updated => stats.events_updated += 1,
            }
        }

        stats.events_deleted = self.events.reconcile_run(source.id, &seen, run_started_at)?;

        self.logs.finish_success(log.id, &stats)?;
        self.sources.update_last_scraped(source.id, Utc::now())?;
        info!(
            "{}: {} found, {} new, {} updated, {} skipped, {} soft-deleted",
            config.name,
            stats.events_found,
            stats.events_new,
            stats.events_updated,
            stats.events_skipped,
            stats.events_deleted
        );

        Ok(RunReport {
            source_name: config.name.clone(),
            log_id: Some(log.id),
            status: ScrapeStatus::Success,
            stats,
            error: None,
        })
    }

    /// Run every adapter sequentially, isolating failures per source.
    /// Sources flagged inactive are skipped.
    pub async fn run_all(&self, adapters: &[Box<dyn SiteAdapter>]) -> Vec<RunReport> {
        let mut reports = Vec::with_capacity(adapters.len());

        for adapter in adapters {
            let config = adapter.config();

            match self.sources.get_by_base_url(&config.base_url) {
                Ok(Some(source)) if !source.is_active => {
                    info!("{}: inactive, skipping", config.name);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("{}: source lookup failed: {}", config.name, e);
                    continue;
                }
            }

            match self.run_site(adapter.as_ref()).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("{}: run aborted: {}", config.name, e);
                    reports.push(RunReport {
                        source_name: config.name.clone(),
                        log_id: None,
                        status: ScrapeStatus::Failed,
                        stats: RunStats::default(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        reports
    }
}
