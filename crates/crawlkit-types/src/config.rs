//! Configuration snapshot consumed by the core.
//!
//! This crate never loads, validates, or watches configuration — that is
//! explicitly out of scope. `CrawlConfig` is the frozen snapshot
//! the engine is handed at `start()`; building/validating one is the
//! caller's job.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Basic crawl-wide options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicConfig {
    pub max_concurrent_tasks: usize,
    pub max_depth: u32,
    pub max_pages: Option<u64>,
    pub request_delay: Duration,
    pub timeout_seconds: u64,
    pub respect_robots_txt: bool,
    pub follow_redirects: bool,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            max_depth: 3,
            max_pages: None,
            request_delay: Duration::from_millis(500),
            timeout_seconds: 30,
            respect_robots_txt: true,
            follow_redirects: true,
        }
    }
}

/// Domain allow/block rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainsConfig {
    pub allowed_domains: Vec<String>,
    pub blocked_patterns: Vec<String>,
}

/// Resource ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub memory_limit_mb: usize,
    pub max_queue_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 512,
            max_queue_size: 100_000,
        }
    }
}

/// Base retry parameters; the effective
/// caps per error kind are computed by the retry coordinator and may
/// tighten these further based on consecutive-error counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

/// Anti-bot gate toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiBotConfig {
    pub enable_detection: bool,
    pub retry_policy: RetryPolicyConfig,
}

impl Default for AntiBotConfig {
    fn default() -> Self {
        Self {
            enable_detection: true,
            retry_policy: RetryPolicyConfig::default(),
        }
    }
}

/// Metrics/observability toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    pub metrics_interval_seconds: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_interval_seconds: 30,
        }
    }
}

/// Frozen configuration snapshot the engine is started with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub basic: BasicConfig,
    pub domains: DomainsConfig,
    pub performance: PerformanceConfig,
    pub anti_bot: AntiBotConfig,
    pub monitoring: MonitoringConfig,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            basic: BasicConfig::default(),
            domains: DomainsConfig::default(),
            performance: PerformanceConfig::default(),
            anti_bot: AntiBotConfig::default(),
            monitoring: MonitoringConfig::default(),
            user_agent: "crawlkit/0.1".to_string(),
        }
    }
}
