//! Per-domain politeness rate limiter.
//!
//! Enforces a minimum delay between requests to the same domain and backs
//! off further when a site answers 429/503, recovering on success.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone)]
struct DomainState {
    last_request: Option<Instant>,
    current_delay: Duration,
    in_backoff: bool,
}

impl DomainState {
    fn new(delay: Duration) -> Self {
        Self {
            last_request: None,
            current_delay: delay,
            in_backoff: false,
        }
    }

    fn time_until_ready(&self) -> Duration {
        match self.last_request {
            Some(last) => self.current_delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }
}

/// Rate limiter tracking per-domain request timing.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    base_delay: Duration,
    max_delay: Duration,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl RateLimiter {
    /// Create a rate limiter with the given politeness delay per domain.
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: Duration::from_secs(60),
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Extract domain from URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Wait until the domain is ready, then mark the request as started.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        let wait_time = {
            let domains = self.domains.read().await;
            domains
                .get(&domain)
                .map(|s| s.time_until_ready())
                .unwrap_or(Duration::ZERO)
        };

        if wait_time > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        {
            let mut domains = self.domains.write().await;
            let state = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(self.base_delay));
            state.last_request = Some(Instant::now());
        }

        Some(domain)
    }

    /// Report a 429/503 response - doubles the delay up to the cap.
    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.in_backoff = true;
            let doubled = state.current_delay.saturating_mul(2);
            state.current_delay = doubled.min(self.max_delay);
            warn!(
                "Rate limited by {} (HTTP {}), backing off to {:?}",
                domain, status_code, state.current_delay
            );
        }
    }

    /// Report a successful request - leaves backoff once the delay is back
    /// at the base value.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            if state.in_backoff {
                let halved = state.current_delay / 2;
                state.current_delay = halved.max(self.base_delay);
                if state.current_delay <= self.base_delay {
                    state.in_backoff = false;
                    debug!("Domain {} recovered from backoff", domain);
                }
            }
        }
    }

    /// Current delay applied to a domain; for diagnostics.
    pub async fn current_delay(&self, domain: &str) -> Duration {
        let domains = self.domains.read().await;
        domains
            .get(domain)
            .map(|s| s.current_delay)
            .unwrap_or(self.base_delay)
    }
}
