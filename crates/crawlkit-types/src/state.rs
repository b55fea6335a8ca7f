use crate::config::CrawlConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-URL durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlState {
    pub url: String,
    pub discovered_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub status_code: Option<u16>,
    pub content_length: Option<usize>,
    pub content_type: Option<String>,
    pub download_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

impl UrlState {
    pub fn discovered(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            discovered_at: Utc::now(),
            processed_at: None,
            status_code: None,
            content_length: None,
            content_type: None,
            download_time_ms: None,
            error_message: None,
            retry_count: 0,
        }
    }
}

/// The engine's lifecycle state machine.
///
/// Transitions: `Idle -> Running` (start); `Running <-> Paused`
/// (pause/resume); `Running|Paused -> Stopping -> Idle` (stop); any state
/// may transition to `Error` on unrecoverable initialization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlerStatus {
    Idle,
    Running,
    Paused,
    Stopping,
    Error,
}

impl CrawlerStatus {
    /// Whether `to` is a legal transition target from `self`.
    pub fn can_transition_to(&self, to: CrawlerStatus) -> bool {
        use CrawlerStatus::*;
        match (*self, to) {
            (Idle, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running, Stopping) | (Paused, Stopping) => true,
            (Stopping, Idle) => true,
            (_, Error) => true,
            (a, b) if a == b => true, // re-calling pause()/resume() while already there is a no-op
            _ => false,
        }
    }
}

/// Aggregate totals tracked for a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlTotals {
    pub discovered: u64,
    pub processed: u64,
    pub errors: u64,
    pub skipped: u64,
}

/// Aggregate counters surfaced by the periodic statistics writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlStatistics {
    pub urls_processed: u64,
    pub urls_failed: u64,
    pub urls_skipped: u64,
    pub bytes_downloaded: u64,
    pub avg_download_time_ms: f64,
    pub avg_parse_time_ms: f64,
    pub avg_storage_time_ms: f64,
}

/// Per-job durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlState {
    pub job_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: CrawlerStatus,
    pub totals: CrawlTotals,
    pub statistics: CrawlStatistics,
    #[serde(skip)]
    pub configuration: Option<Arc<CrawlConfig>>,
}

impl CrawlState {
    pub fn new(job_id: impl Into<String>, configuration: Arc<CrawlConfig>) -> Self {
        Self {
            job_id: job_id.into(),
            start_time: Utc::now(),
            end_time: None,
            status: CrawlerStatus::Idle,
            totals: CrawlTotals::default(),
            statistics: CrawlStatistics::default(),
            configuration: Some(configuration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_to_running_allowed() {
        assert!(CrawlerStatus::Idle.can_transition_to(CrawlerStatus::Running));
    }

    #[test]
    fn running_paused_round_trip_allowed() {
        assert!(CrawlerStatus::Running.can_transition_to(CrawlerStatus::Paused));
        assert!(CrawlerStatus::Paused.can_transition_to(CrawlerStatus::Running));
    }

    #[test]
    fn idle_cannot_jump_to_paused() {
        assert!(!CrawlerStatus::Idle.can_transition_to(CrawlerStatus::Paused));
    }

    #[test]
    fn stopping_only_goes_to_idle() {
        assert!(CrawlerStatus::Stopping.can_transition_to(CrawlerStatus::Idle));
        assert!(!CrawlerStatus::Stopping.can_transition_to(CrawlerStatus::Running));
        assert!(!CrawlerStatus::Stopping.can_transition_to(CrawlerStatus::Paused));
    }

    #[test]
    fn re_pausing_while_paused_is_a_noop_transition() {
        assert!(CrawlerStatus::Paused.can_transition_to(CrawlerStatus::Paused));
    }

    #[test]
    fn any_state_can_fault_to_error() {
        for s in [
            CrawlerStatus::Idle,
            CrawlerStatus::Running,
            CrawlerStatus::Paused,
            CrawlerStatus::Stopping,
        ] {
            assert!(s.can_transition_to(CrawlerStatus::Error));
        }
    }
}
