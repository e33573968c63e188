//! Incremental job search: state sync, debouncing, infinite scroll, and the session loop.

use std::time::Duration;

use nexjob_core::{AnalyticsEvent, DEFAULT_PAGE_SIZE};
use tracing::info;

pub mod debounce;
pub mod pagination;
pub mod session;
pub mod state;

pub use debounce::Debouncer;
pub use pagination::{ApplyOutcome, FetchTicket, PageStatus, PaginationController};
pub use session::{PageSnapshot, SearchCommand, SearchEvent, SearchHandle, SearchSession};
pub use state::{FilterChip, FilterTarget, ListingQuery, RouteLock, SearchEdit, SearchStateSync};

pub const CRATE_NAME: &str = "nexjob-search";

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Shown in place of results when a fetch after the first load fails.
pub const FETCH_FAILED_MESSAGE: &str = "Gagal memuat data pekerjaan. Silakan coba lagi.";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub page_size: u32,
    pub debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let debounce = std::env::var("NEXJOB_SEARCH_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE);
        Self {
            debounce,
            ..Self::default()
        }
    }
}

/// Fire-and-forget analytics delivery.
pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event: &AnalyticsEvent);
}

#[derive(Default)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn record(&self, _event: &AnalyticsEvent) {}
}

/// Emits each event as a structured log line on the `nexjob::analytics` target.
#[derive(Default)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn record(&self, event: &AnalyticsEvent) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        info!(target: "nexjob::analytics", event = event.name(), %payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_uses_listing_page_size() {
        let config = SessionConfig::default();
        assert_eq!(config.page_size, 24);
        assert_eq!(config.debounce, Duration::from_millis(300));
    }

    #[test]
    fn sinks_accept_every_event() {
        let event = AnalyticsEvent::Search {
            term: "kasir".into(),
            location: None,
            category: None,
        };
        NoopAnalytics.record(&event);
        TracingAnalytics.record(&event);
    }
}
