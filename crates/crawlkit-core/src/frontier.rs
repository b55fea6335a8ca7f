//! URL frontier / scheduler: priority queue, dedup, per-origin pacing,
//! and the allow/block policy gate. Storage backends are an external
//! collaborator, so there is no disk-spillover path here — everything
//! lives in memory for the lifetime of the crawl.

use crawlkit_types::CrawlRequest;
use dashmap::DashMap;
use regex::RegexSet;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct FrontierConfig {
    pub max_queue_size: usize,
    pub allowed_domains: Vec<String>,
    pub blocked_patterns: Vec<String>,
    /// Minimum time between two pops for the same origin.
    pub min_request_interval: Duration,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 100_000,
            allowed_domains: Vec::new(),
            blocked_patterns: Vec::new(),
            min_request_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FrontierCounters {
    pub queued: u64,
    pub processed: u64,
    pub errors: u64,
    pub skipped: u64,
}

/// Canonicalize a URL: lowercase scheme/host, drop default
/// ports, remove fragment; path/query untouched.
fn canonicalize(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);
    let scheme = url.scheme().to_lowercase();
    url.set_scheme(&scheme).ok()?;
    if let Some(host) = url.host_str() {
        let host = host.to_lowercase();
        url.set_host(Some(&host)).ok()?;
    }
    let is_default_port = matches!((scheme.as_str(), url.port()), ("http", Some(80)) | ("https", Some(443)));
    if is_default_port {
        url.set_port(None).ok()?;
    }
    Some(url.to_string())
}

struct QueuedRequest {
    request: CrawlRequest,
    sequence: u64,
    domains: Arc<DashMap<String, DomainHealth>>,
}

impl QueuedRequest {
    fn domain_success_rate(&self) -> f64 {
        self.request
            .host()
            .and_then(|h| self.domains.get(&h).map(|d| d.success_rate()))
            .unwrap_or(0.5)
    }
}

/// Ordered by descending priority; priority ties break by descending
/// domain success rate (read live off the shared health map on every
/// comparison), then by ascending insertion sequence.
impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.request.priority == other.request.priority && self.sequence == other.sequence
    }
}
impl Eq for QueuedRequest {}
impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| {
                self.domain_success_rate()
                    .partial_cmp(&other.domain_success_rate())
                    .unwrap_or(CmpOrdering::Equal)
            })
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Default)]
struct DomainHealth {
    successes: u64,
    failures: u64,
    next_ready_at: Option<Instant>,
    custom_interval: Option<Duration>,
}

impl DomainHealth {
    fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            0.5
        } else {
            self.successes as f64 / total as f64
        }
    }
}

/// URL frontier: dedup, priority ordering, per-domain pacing, and the
/// allow/block policy gate.
pub struct Frontier {
    config: FrontierConfig,
    queue: Mutex<BinaryHeap<QueuedRequest>>,
    seen: Mutex<HashSet<String>>,
    domains: Arc<DashMap<String, DomainHealth>>,
    blocked: RegexSet,
    sequence: AtomicU64,
    queued: AtomicU64,
    processed: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
}

impl Frontier {
    pub fn new(config: FrontierConfig) -> Self {
        let blocked = RegexSet::new(&config.blocked_patterns).unwrap_or_else(|e| {
            warn!(error = %e, "invalid blocked pattern, treating as empty block list");
            RegexSet::empty()
        });
        Self {
            config,
            queue: Mutex::new(BinaryHeap::new()),
            seen: Mutex::new(HashSet::new()),
            domains: Arc::new(DashMap::new()),
            blocked,
            sequence: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn counters(&self) -> FrontierCounters {
        FrontierCounters {
            queued: self.queued.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// Count a request that left the pipeline via policy rejection
    /// (robots disallow, anti-bot skip, depth exceeded) rather than an
    /// attempted download.
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Override the per-domain pacing interval, e.g. from a fetched
    /// `robots.txt`'s `Crawl-delay`. Takes effect on the domain's next
    /// dispatch.
    pub fn set_domain_interval(&self, domain: &str, interval: Duration) {
        self.domains.entry(domain.to_string()).or_default().custom_interval = Some(interval);
    }

    fn policy_allows(&self, url: &str, host: Option<&str>) -> bool {
        if self.blocked.is_match(url) {
            return false;
        }
        if !self.config.allowed_domains.is_empty() {
            let Some(host) = host else { return false };
            return self
                .config
                .allowed_domains
                .iter()
                .any(|allowed| host == allowed.to_lowercase() || host.ends_with(&format!(".{}", allowed.to_lowercase())));
        }
        true
    }

    /// Accept one request. Returns whether it was newly admitted.
    pub async fn add(&self, request: CrawlRequest) -> bool {
        let Some(canonical) = canonicalize(&request.url) else {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        let host = request.host();
        if !self.policy_allows(&canonical, host.as_deref()) {
            return false;
        }
        if self.queued.load(Ordering::Relaxed) as usize >= self.config.max_queue_size {
            warn!(url = %request.url, "frontier at max queue size, dropping request");
            return false;
        }

        {
            let mut seen = self.seen.lock().await;
            if !seen.insert(canonical) {
                return false;
            }
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().await.push(QueuedRequest {
            request,
            sequence,
            domains: self.domains.clone(),
        });
        self.queued.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Batch version of [`Frontier::add`]; returns the admitted count.
    pub async fn add_many(&self, requests: Vec<CrawlRequest>) -> usize {
        let mut admitted = 0;
        for request in requests {
            if self.add(request).await {
                admitted += 1;
            }
        }
        admitted
    }

    /// Pop the highest-priority request whose origin is ready, or `None`
    /// if the queue is empty or everything pending is pacing-delayed.
    pub async fn next(&self) -> Option<CrawlRequest> {
        let mut queue = self.queue.lock().await;
        let now = Instant::now();

        let mut held_back = Vec::new();
        let popped = loop {
            let Some(candidate) = queue.pop() else {
                break None;
            };
            let host = candidate.request.host();
            let ready = host
                .as_deref()
                .map(|h| self.domain_ready(h, now))
                .unwrap_or(true);
            if ready {
                break Some(candidate);
            }
            held_back.push(candidate);
        };
        for item in held_back {
            queue.push(item);
        }

        let popped = popped?;
        drop(queue);

        if let Some(host) = popped.request.host() {
            self.mark_dispatched(&host, now);
        }
        self.queued.fetch_sub(1, Ordering::Relaxed);
        Some(popped.request)
    }

    fn domain_ready(&self, host: &str, now: Instant) -> bool {
        self.domains
            .get(host)
            .and_then(|d| d.next_ready_at)
            .map(|ready_at| now >= ready_at)
            .unwrap_or(true)
    }

    fn mark_dispatched(&self, host: &str, now: Instant) {
        let mut entry = self.domains.entry(host.to_string()).or_default();
        let interval = entry.custom_interval.unwrap_or(self.config.min_request_interval);
        entry.next_ready_at = Some(now + interval);
    }

    /// Update the domain's rolling health metric used by tie-breaking.
    pub fn record_domain_performance(&self, domain: &str, _duration_ms: u64, success: bool) {
        let mut entry = self.domains.entry(domain.to_string()).or_default();
        if success {
            entry.successes += 1;
            self.processed.fetch_add(1, Ordering::Relaxed);
        } else {
            entry.failures += 1;
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        debug!(domain, success_rate = entry.success_rate(), "domain performance updated");
    }
}
