//! Per-domain retry decision and circuit breaker: a single ledger per
//! domain tracking consecutive/total errors, circuit phase, and backoff.

use crawlkit_types::ErrorKind;
use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

const CONSECUTIVE_ERROR_CEILING: u32 = 10;
const CIRCUIT_OPEN_COOLDOWN: Duration = Duration::from_secs(30);
const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 2;
const HALF_OPEN_ATTEMPT_LIMIT: u32 = 3;
const RECENT_SUCCESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Circuit breaker state for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-origin ledger the retry component exclusively owns; other
/// components only read through [`RetryCoordinator::stats`].
#[derive(Debug, Clone)]
pub struct DomainRetryInfo {
    pub consecutive_errors: u32,
    pub total_errors: u64,
    pub total_success: u64,
    pub last_error_at: Option<Instant>,
    pub last_success_at: Option<Instant>,
    pub last_error_kind: Option<ErrorKind>,
    pub error_kind_counts: std::collections::HashMap<ErrorKind, u64>,
    pub circuit_state: CircuitState,
    pub circuit_opened_at: Option<Instant>,
    pub half_open_attempts: u32,
    pub half_open_successes: u32,
}

impl Default for DomainRetryInfo {
    fn default() -> Self {
        Self {
            consecutive_errors: 0,
            total_errors: 0,
            total_success: 0,
            last_error_at: None,
            last_success_at: None,
            last_error_kind: None,
            error_kind_counts: std::collections::HashMap::new(),
            circuit_state: CircuitState::Closed,
            circuit_opened_at: None,
            half_open_attempts: 0,
            half_open_successes: 0,
        }
    }
}

/// Base retry parameters the coordinator is configured with; per-kind and
/// per-consecutive-error tightening is applied on top of `base_max_retries`.
#[derive(Debug, Clone)]
pub struct RetryCoordinatorConfig {
    pub base_max_retries: u32,
}

impl Default for RetryCoordinatorConfig {
    fn default() -> Self {
        Self { base_max_retries: 3 }
    }
}

/// Owns every domain's [`DomainRetryInfo`] and decides retry/backoff.
pub struct RetryCoordinator {
    config: RetryCoordinatorConfig,
    domains: DashMap<String, Arc<Mutex<DomainRetryInfo>>>,
}

impl RetryCoordinator {
    pub fn new(config: RetryCoordinatorConfig) -> Self {
        Self {
            config,
            domains: DashMap::new(),
        }
    }

    fn entry(&self, domain: &str) -> Arc<Mutex<DomainRetryInfo>> {
        self.domains
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(DomainRetryInfo::default())))
            .clone()
    }

    /// Record a failed attempt against `domain`, updating its ledger and
    /// possibly tripping the circuit. Must be called *before*
    /// [`RetryCoordinator::should_retry`] for the same occurrence.
    pub async fn record_error(&self, domain: &str, kind: ErrorKind) {
        let entry = self.entry(domain);
        let mut info = entry.lock().await;
        let now = Instant::now();

        info.consecutive_errors += 1;
        info.total_errors += 1;
        info.last_error_at = Some(now);
        info.last_error_kind = Some(kind);
        *info.error_kind_counts.entry(kind).or_insert(0) += 1;

        match info.circuit_state {
            CircuitState::Closed => {
                if info.consecutive_errors >= CONSECUTIVE_ERROR_CEILING {
                    warn!(domain, consecutive_errors = info.consecutive_errors, "circuit opening");
                    info.circuit_state = CircuitState::Open;
                    info.circuit_opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                info.half_open_attempts += 1;
                if info.half_open_attempts >= HALF_OPEN_ATTEMPT_LIMIT
                    && info.half_open_successes < HALF_OPEN_SUCCESS_THRESHOLD
                {
                    warn!(domain, "circuit reopening after failed half-open probes");
                    info.circuit_state = CircuitState::Open;
                    info.circuit_opened_at = Some(now);
                    info.half_open_attempts = 0;
                    info.half_open_successes = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a success against `domain`.
    pub async fn record_success(&self, domain: &str) {
        let entry = self.entry(domain);
        let mut info = entry.lock().await;
        let now = Instant::now();

        info.total_success += 1;
        info.last_success_at = Some(now);

        match info.circuit_state {
            CircuitState::Closed => {
                info.consecutive_errors = 0;
            }
            CircuitState::HalfOpen => {
                info.half_open_successes += 1;
                if info.half_open_successes >= HALF_OPEN_SUCCESS_THRESHOLD {
                    info!(domain, "circuit closing after successful probes");
                    info.circuit_state = CircuitState::Closed;
                    info.consecutive_errors = 0;
                    info.half_open_attempts = 0;
                    info.half_open_successes = 0;
                }
            }
            CircuitState::Open => {
                // Defensive: an unexpected success while open still recovers the domain.
                info!(domain, "circuit closing on unexpected success while open");
                info.circuit_state = CircuitState::Closed;
                info.consecutive_errors = 0;
            }
        }
    }

    /// Decide whether a request against `domain` that has failed `kind`
    /// should be retried, and if so after how long.
    pub async fn should_retry(&self, domain: &str, kind: ErrorKind, current_retry_count: u32) -> (bool, u64) {
        let entry = self.entry(domain);
        let mut info = entry.lock().await;
        let now = Instant::now();

        // Open -> HalfOpen transition on cooldown elapsed.
        if info.circuit_state == CircuitState::Open {
            if let Some(opened_at) = info.circuit_opened_at {
                if now.saturating_duration_since(opened_at) > CIRCUIT_OPEN_COOLDOWN {
                    info!(domain, "circuit half-opening after cooldown");
                    info.circuit_state = CircuitState::HalfOpen;
                    info.half_open_attempts = 0;
                    info.half_open_successes = 0;
                }
            }
        }

        if info.circuit_state == CircuitState::Open {
            return (false, 0);
        }

        if !kind.is_retryable_kind() {
            return (false, 0);
        }

        let effective_max = effective_max_retries(info.consecutive_errors, self.config.base_max_retries);
        if current_retry_count >= effective_max {
            return (false, 0);
        }

        if info.consecutive_errors >= CONSECUTIVE_ERROR_CEILING {
            return (false, 0);
        }

        if let Some(last_success_at) = info.last_success_at {
            if now.saturating_duration_since(last_success_at) < RECENT_SUCCESS_WINDOW && current_retry_count >= 1 {
                return (false, 0);
            }
        }

        let Some(kind_cap) = kind_retry_cap(kind, info.consecutive_errors) else {
            return (false, 0);
        };
        if current_retry_count >= kind_cap {
            return (false, 0);
        }

        let delay_ms = backoff_delay_ms(current_retry_count, info.consecutive_errors, kind);
        debug!(domain, kind = ?kind, current_retry_count, delay_ms, "retry authorised");
        (true, delay_ms)
    }

    /// Read-only snapshot of a domain's ledger.
    pub async fn stats(&self, domain: &str) -> Option<DomainRetryInfo> {
        let entry = self.domains.get(domain)?.clone();
        Some(entry.lock().await.clone())
    }

    /// Operator-initiated manual recovery: drop all history for `domain`.
    pub fn reset(&self, domain: &str) {
        self.domains.remove(domain);
    }
}

/// Tightens the retry budget as a domain accumulates consecutive errors.
fn effective_max_retries(consecutive_errors: u32, base: u32) -> u32 {
    if consecutive_errors > 5 {
        1
    } else if consecutive_errors > 2 {
        2
    } else {
        base
    }
}

/// Per-error-kind retry cap table.
fn kind_retry_cap(kind: ErrorKind, consecutive_errors: u32) -> Option<u32> {
    match kind {
        ErrorKind::RateLimited => Some(if consecutive_errors > 3 { 1 } else { 2 }),
        ErrorKind::ServerError => Some(if consecutive_errors > 5 { 1 } else { 2 }),
        ErrorKind::BadGateway => Some(3),
        ErrorKind::ServiceUnavailable => Some(2),
        ErrorKind::GatewayTimeout => Some(2),
        ErrorKind::Unauthorized | ErrorKind::Forbidden => None,
        ErrorKind::Timeout => Some(if consecutive_errors > 3 { 1 } else { 3 }),
        ErrorKind::ConnectionFailure => Some(2),
        ErrorKind::DnsFailure => None,
        ErrorKind::Security => None,
        ErrorKind::Io => Some(2),
        ErrorKind::Other => Some(if consecutive_errors > 5 { 1 } else { 2 }),
    }
}

/// Jittered exponential backoff, scaled by error kind and domain health.
fn backoff_delay_ms(current_retry_count: u32, consecutive_errors: u32, kind: ErrorKind) -> u64 {
    let base = (2u64.saturating_pow(current_retry_count)) * 1000;
    let multiplier = if matches!(kind, ErrorKind::RateLimited) {
        3.0
    } else if consecutive_errors > 5 {
        2.0
    } else if consecutive_errors > 2 {
        1.5
    } else {
        1.0
    };
    let jitter = rand::thread_rng().gen_range(0..=500u64);
    ((base as f64) * multiplier) as u64 + jitter
}
