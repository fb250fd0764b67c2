//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use chrono::Duration;
use clap::{Parser, Subcommand};
use console::style;

use crate::config::{load_settings, Settings};
use crate::models::{LocationStatus, ScrapeStatus};
use crate::repository::{
    self, EventRepository, LocationRepository, ScrapeLogRepository, SourceRepository,
};
use crate::scrapers::{build_adapter, builtin_sites, SiteAdapter};
use crate::services::{Geocoder, GoogleGeocoder, ScrapeRunner};

/// Runs older than this without a finish timestamp are shown as stale.
const STALE_AFTER_HOURS: i64 = 6;

#[derive(Parser)]
#[command(name = "muni")]
#[command(about = "Municipal event aggregation and scraping system")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to muniscrape.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// List registered sites and their onboarding state
    Sites,

    /// Scrape one or more sites (by registry name)
    Scrape {
        /// Site names to scrape (see `muni sites`)
        sites: Vec<String>,
        /// Scrape all registered sites
        #[arg(short, long)]
        all: bool,
    },

    /// Show recent scrape runs
    Status {
        /// Number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// List locations by curation status
    Locations {
        /// Workflow status: pending, confirmed or ignored
        #[arg(long, default_value = "pending")]
        status: String,
    },

    /// List live events of one site
    Events {
        /// Site name (see `muni sites`)
        site: String,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => init(&settings),
        Commands::Sites => sites(&settings),
        Commands::Scrape { sites, all } => scrape(&settings, sites, all).await,
        Commands::Status { limit } => status(&settings, limit),
        Commands::Locations { status } => locations(&settings, &status),
        Commands::Events { site } => events(&settings, &site),
    }
}

fn init(settings: &Settings) -> anyhow::Result<()> {
    repository::initialize(&settings.database_path)?;
    println!(
        "{} database ready at {}",
        style("✓").green(),
        settings.database_path.display()
    );
    Ok(())
}

fn sites(settings: &Settings) -> anyhow::Result<()> {
    let sources = SourceRepository::new(&settings.database_path)?;

    for (key, config) in builtin_sites() {
        let onboarded = sources.get_by_base_url(&config.base_url)?;
        let state = match &onboarded {
            Some(source) if source.is_active => style("active").green(),
            Some(_) => style("inactive").yellow(),
            None => style("not onboarded").dim(),
        };
        let last = onboarded
            .and_then(|s| s.last_scraped_at)
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<12} {:<24} {:<14} last scraped: {}",
            style(&key).bold(),
            config.name,
            state,
            last
        );
    }
    Ok(())
}

fn build_geocoder(settings: &Settings) -> Arc<dyn Geocoder> {
    if settings.google_api_key.is_empty() && !settings.geocoding_dry_run {
        eprintln!(
            "{} no GOOGLE_API_KEY configured - geocoding will be recorded as errors",
            style("warning:").yellow()
        );
    }
    Arc::new(GoogleGeocoder::new(
        settings.google_api_key.clone(),
        settings.geocoding_timeout(),
        settings.geocoding_dry_run,
    ))
}

async fn scrape(settings: &Settings, names: Vec<String>, all: bool) -> anyhow::Result<()> {
    let registry = builtin_sites();

    let selected: Vec<String> = if all {
        registry.keys().cloned().collect()
    } else if names.is_empty() {
        bail!("no sites given; pass site names or --all");
    } else {
        for name in &names {
            if !registry.contains_key(name) {
                bail!("unknown site '{name}'; see `muni sites`");
            }
        }
        names
    };

    let adapters: Vec<Box<dyn SiteAdapter>> = selected
        .iter()
        .filter_map(|name| registry.get(name).cloned())
        .map(build_adapter)
        .collect();

    let runner = ScrapeRunner::new(settings, build_geocoder(settings))?;
    let reports = runner.run_all(&adapters).await;

    let mut total_found = 0;
    let mut total_new = 0;
    let mut total_updated = 0;
    let mut failures = 0;

    for report in &reports {
        match report.status {
            ScrapeStatus::Success => {
                println!(
                    "{} {}: {} found, {} new, {} updated, {} soft-deleted ({} geocoded, {} ambiguous)",
                    style("✓").green(),
                    report.source_name,
                    report.stats.events_found,
                    report.stats.events_new,
                    report.stats.events_updated,
                    report.stats.events_deleted,
                    report.stats.geocoding.success,
                    report.stats.geocoding.multiple,
                );
                total_found += report.stats.events_found;
                total_new += report.stats.events_new;
                total_updated += report.stats.events_updated;
            }
            _ => {
                failures += 1;
                println!(
                    "{} {}: {}",
                    style("✗").red(),
                    report.source_name,
                    report.error.as_deref().unwrap_or("failed")
                );
            }
        }
    }

    println!(
        "\n{} sources, {} events ({} new, {} updated), {} failures",
        reports.len(),
        total_found,
        total_new,
        total_updated,
        failures
    );
    Ok(())
}

fn status(settings: &Settings, limit: u32) -> anyhow::Result<()> {
    let logs = ScrapeLogRepository::new(&settings.database_path)?;
    let sources = SourceRepository::new(&settings.database_path)?;

    let recent = logs.recent(limit)?;
    if recent.is_empty() {
        println!("no scrape runs recorded yet");
        return Ok(());
    }

    for log in recent {
        let source_name = sources
            .get(log.source_id)?
            .map(|s| s.name)
            .unwrap_or_else(|| format!("source #{}", log.source_id));

        let status = if log.is_stale(Duration::hours(STALE_AFTER_HOURS)) {
            style("stale").red()
        } else {
            match log.status {
                ScrapeStatus::Success => style("success").green(),
                ScrapeStatus::Failed => style("failed").red(),
                ScrapeStatus::Running => style("running").yellow(),
            }
        };

        println!(
            "#{:<5} {}  {:<24} {:<8} {} found / {} new / {} updated  geo: {}/{}/{}/{}",
            log.id,
            log.started_at.format("%Y-%m-%d %H:%M"),
            source_name,
            status,
            log.events_found,
            log.events_new,
            log.events_updated,
            log.geocoding_success,
            log.geocoding_multiple,
            log.geocoding_not_found,
            log.geocoding_errors,
        );
        if let Some(error) = &log.error_message {
            println!("       {}", style(error).red());
        }
    }
    Ok(())
}

fn locations(settings: &Settings, status: &str) -> anyhow::Result<()> {
    let Some(status) = LocationStatus::from_str(status) else {
        bail!("unknown status '{status}'; expected pending, confirmed or ignored");
    };

    let locations = LocationRepository::new(&settings.database_path)?;
    let sources = SourceRepository::new(&settings.database_path)?;

    let rows = locations.list_by_status(status)?;
    if rows.is_empty() {
        println!("no {} locations", status.as_str());
        return Ok(());
    }

    for location in rows {
        let source_name = sources
            .get(location.source_id)?
            .map(|s| s.name)
            .unwrap_or_else(|| format!("source #{}", location.source_id));

        let geo = match location.geocoding_status {
            Some(s) => s.as_str(),
            None => "unset",
        };
        let coords = match (location.latitude, location.longitude) {
            (Some(lat), Some(lon)) => format!("{lat:.5}, {lon:.5}"),
            _ => "-".to_string(),
        };

        println!(
            "#{:<5} {:<30} {:<24} geocoding: {:<10} {}",
            location.id,
            location.raw_name,
            source_name,
            geo,
            coords
        );
    }
    Ok(())
}

fn events(settings: &Settings, site: &str) -> anyhow::Result<()> {
    let registry = builtin_sites();
    let Some(config) = registry.get(site) else {
        bail!("unknown site '{site}'; see `muni sites`");
    };

    let sources = SourceRepository::new(&settings.database_path)?;
    let Some(source) = sources.get_by_base_url(&config.base_url)? else {
        bail!("site '{site}' has not been scraped yet");
    };

    let events = EventRepository::new(&settings.database_path)?;
    for event in events.list_for_source(source.id)? {
        let time = event
            .event_time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string());
        println!(
            "{} {}  {:<50} {}",
            event.event_date.format("%Y-%m-%d"),
            time,
            event.title,
            event.raw_location.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
