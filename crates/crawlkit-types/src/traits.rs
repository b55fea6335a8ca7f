//! Plugin contracts the core consumes. Concrete implementations
//! (HTTP clients, headless browsers, HTML/JSON parsers, filesystem/SQL
//! storage) are out of scope for this crate.

use crate::error::CrawlError;
use crate::request::CrawlRequest;
use crate::results::{DownloadResult, ParseResult};
use crate::state::{CrawlState, CrawlStatistics, UrlState};
use async_trait::async_trait;
use std::collections::HashMap;

/// A downloader implementation, ordered by `priority()` within the
/// dispatcher's chain for the Download stage.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn initialize(&self) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn download(&self, request: &CrawlRequest) -> Result<DownloadResult, CrawlError>;

    /// Higher values run first. The built-in default should be `i32::MIN`.
    fn priority(&self) -> i32 {
        0
    }

    async fn shutdown(&self) -> Result<(), CrawlError> {
        Ok(())
    }
}

/// A parser implementation, ordered by `priority()` within the dispatcher's
/// chain for the Parse stage.
#[async_trait]
pub trait Parser: Send + Sync {
    async fn initialize(&self) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn parse(&self, download: &DownloadResult, request: &CrawlRequest) -> Result<ParseResult, CrawlError>;

    fn priority(&self) -> i32 {
        0
    }

    async fn shutdown(&self) -> Result<(), CrawlError> {
        Ok(())
    }
}

/// A storage implementation, ordered by `priority()` within the
/// dispatcher's chain for the Store stage.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn initialize(&self) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn save(&self, result: &crate::results::CrawlResult) -> Result<(), CrawlError>;

    async fn save_statistics(&self, _stats: &CrawlStatistics) -> Result<(), CrawlError> {
        Ok(())
    }

    fn priority(&self) -> i32 {
        0
    }

    async fn shutdown(&self) -> Result<(), CrawlError> {
        Ok(())
    }
}

/// Durable metadata persistence consumed by the engine's periodic
/// statistics writer and per-URL bookkeeping.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn save_crawl_state(&self, state: &CrawlState) -> Result<(), CrawlError>;
    async fn get_crawl_state(&self, job_id: &str) -> Result<Option<CrawlState>, CrawlError>;
    async fn save_url_state(&self, state: &UrlState) -> Result<(), CrawlError>;
    async fn get_url_state(&self, url: &str) -> Result<Option<UrlState>, CrawlError>;
}

/// Metrics sink capability: counters, histograms, and
/// per-error counters, labelled by domain and status where applicable.
pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &str, labels: &HashMap<String, String>, value: u64);
    fn observe_histogram(&self, name: &str, labels: &HashMap<String, String>, value_ms: f64);
}

/// A no-op sink; the default when no monitoring collaborator is injected.
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn incr_counter(&self, _name: &str, _labels: &HashMap<String, String>, _value: u64) {}
    fn observe_histogram(&self, _name: &str, _labels: &HashMap<String, String>, _value_ms: f64) {}
}

/// In-memory reference sink for tests: counters keyed by metric name
/// (labels dropped), histograms keep every observed value for assertions
/// on count/sum.
#[derive(Default)]
pub struct AtomicMetricsSink {
    counters: std::sync::Mutex<HashMap<String, u64>>,
    histograms: std::sync::Mutex<HashMap<String, Vec<f64>>>,
}

impl AtomicMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn histogram_values(&self, name: &str) -> Vec<f64> {
        self.histograms.lock().unwrap().get(name).cloned().unwrap_or_default()
    }
}

impl MetricsSink for AtomicMetricsSink {
    fn incr_counter(&self, name: &str, _labels: &HashMap<String, String>, value: u64) {
        *self.counters.lock().unwrap().entry(name.to_string()).or_insert(0) += value;
    }

    fn observe_histogram(&self, name: &str, _labels: &HashMap<String, String>, value_ms: f64) {
        self.histograms.lock().unwrap().entry(name.to_string()).or_default().push(value_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_sink_accumulates_counters_and_histogram_samples() {
        let sink = AtomicMetricsSink::new();
        let labels = HashMap::new();
        sink.incr_counter("urls_processed", &labels, 1);
        sink.incr_counter("urls_processed", &labels, 2);
        sink.observe_histogram("download_duration_ms", &labels, 12.5);

        assert_eq!(sink.counter("urls_processed"), 3);
        assert_eq!(sink.counter("urls_failed"), 0);
        assert_eq!(sink.histogram_values("download_duration_ms"), vec![12.5]);
    }
}
