//! Robots gate: fetch, cache, and evaluate `robots.txt`.
//!
//! The concrete HTTP fetch is pulled out behind [`RobotsFetcher`] —
//! fetching pages is an out-of-scope collaborator here, only the
//! caching/evaluation logic is.

use async_trait::async_trait;
use dashmap::DashMap;
use robotstxt::DefaultMatcher;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// What a [`RobotsFetcher`] returns for one origin's `/robots.txt`.
pub enum RobotsFetchOutcome {
    /// The file was retrieved successfully.
    Found(String),
    /// The origin answered with a 4xx; treated as "no restrictions".
    NotFound,
    /// The fetch itself failed (DNS, timeout, connection refused, ...).
    FetchFailed(String),
}

/// Narrow seam for retrieving `robots.txt`; concrete HTTP is out of scope.
#[async_trait]
pub trait RobotsFetcher: Send + Sync {
    async fn fetch(&self, origin: &str) -> RobotsFetchOutcome;
}

#[derive(Clone)]
struct CachedRobots {
    content: Option<String>,
    allow_all: bool,
    crawl_delay: Option<f64>,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedRobots {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

#[derive(Debug, Clone)]
pub struct RobotsGateConfig {
    pub user_agent: String,
    pub cache_ttl: Duration,
    pub max_crawl_delay_secs: f64,
    pub respect_robots: bool,
}

impl Default for RobotsGateConfig {
    fn default() -> Self {
        Self {
            user_agent: "crawlkit/1.0".to_string(),
            cache_ttl: Duration::from_secs(3600),
            max_crawl_delay_secs: 10.0,
            respect_robots: true,
        }
    }
}

/// Per-origin robots.txt cache and evaluator.
pub struct RobotsGate {
    config: RobotsGateConfig,
    fetcher: Arc<dyn RobotsFetcher>,
    cache: DashMap<String, CachedRobots>,
    fetch_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RobotsGate {
    pub fn new(config: RobotsGateConfig, fetcher: Arc<dyn RobotsFetcher>) -> Self {
        Self {
            config,
            fetcher,
            cache: DashMap::new(),
            fetch_locks: DashMap::new(),
        }
    }

    /// Whether `url` may be fetched under the origin's current rules.
    pub async fn is_allowed(&self, url: &str) -> bool {
        if !self.config.respect_robots {
            return true;
        }
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let Some(host) = parsed.host_str() else {
            return true;
        };

        let robots = self.get_or_fetch(host).await;
        if robots.allow_all {
            return true;
        }
        let content = robots.content.as_deref().unwrap_or("");
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(content, &self.config.user_agent, url)
    }

    /// The origin's `Crawl-delay`, if any, for the frontier's pacing.
    pub async fn crawl_delay(&self, origin: &str) -> Option<f64> {
        self.get_or_fetch(origin).await.crawl_delay
    }

    async fn get_or_fetch(&self, host: &str) -> CachedRobots {
        if let Some(cached) = self.cache.get(host) {
            if !cached.is_expired() {
                return cached.clone();
            }
        }

        // Single-flight per host: concurrent first-touches wait for one fetch.
        let lock = self
            .fetch_locks
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(cached) = self.cache.get(host) {
            if !cached.is_expired() {
                return cached.clone();
            }
        }

        let fetched = match self.fetcher.fetch(host).await {
            RobotsFetchOutcome::Found(content) => {
                let crawl_delay = self.extract_crawl_delay(&content);
                CachedRobots {
                    content: Some(content),
                    allow_all: false,
                    crawl_delay,
                    cached_at: Instant::now(),
                    ttl: self.config.cache_ttl,
                }
            }
            RobotsFetchOutcome::NotFound => {
                debug!(host, "robots.txt not found, allowing all");
                CachedRobots {
                    content: None,
                    allow_all: true,
                    crawl_delay: None,
                    cached_at: Instant::now(),
                    ttl: self.config.cache_ttl,
                }
            }
            RobotsFetchOutcome::FetchFailed(reason) => {
                warn!(host, reason, "robots.txt fetch failed, allowing all");
                CachedRobots {
                    content: None,
                    allow_all: true,
                    crawl_delay: None,
                    cached_at: Instant::now(),
                    // Failed fetches get a short TTL: retry soon instead of
                    // treating a transient outage as permanent.
                    ttl: Duration::from_secs(60),
                }
            }
        };

        self.cache.insert(host.to_string(), fetched.clone());
        fetched
    }

    fn extract_crawl_delay(&self, content: &str) -> Option<f64> {
        for line in content.lines() {
            let line = line.trim().to_lowercase();
            if let Some(rest) = line.strip_prefix("crawl-delay:") {
                if let Ok(delay) = rest.trim().parse::<f64>() {
                    return Some(delay.max(0.1).min(self.config.max_crawl_delay_secs));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticFetcher(RobotsFetchOutcomeKind);

    enum RobotsFetchOutcomeKind {
        Disallow,
        NotFound,
        Failed,
    }

    #[async_trait]
    impl RobotsFetcher for StaticFetcher {
        async fn fetch(&self, _origin: &str) -> RobotsFetchOutcome {
            match self.0 {
                RobotsFetchOutcomeKind::Disallow => RobotsFetchOutcome::Found(
                    "User-agent: *\nDisallow: /private\nCrawl-delay: 2\n".to_string(),
                ),
                RobotsFetchOutcomeKind::NotFound => RobotsFetchOutcome::NotFound,
                RobotsFetchOutcomeKind::Failed => RobotsFetchOutcome::FetchFailed("timeout".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn disallows_blocked_paths_and_allows_others() {
        let gate = RobotsGate::new(
            RobotsGateConfig::default(),
            Arc::new(StaticFetcher(RobotsFetchOutcomeKind::Disallow)),
        );
        assert!(!gate.is_allowed("https://example.test/private/page").await);
        assert!(gate.is_allowed("https://example.test/public/page").await);
    }

    #[tokio::test]
    async fn extracts_crawl_delay() {
        let gate = RobotsGate::new(
            RobotsGateConfig::default(),
            Arc::new(StaticFetcher(RobotsFetchOutcomeKind::Disallow)),
        );
        let delay = gate.crawl_delay("example.test").await;
        assert_eq!(delay, Some(2.0));
    }

    #[tokio::test]
    async fn missing_robots_txt_allows_everything() {
        let gate = RobotsGate::new(
            RobotsGateConfig::default(),
            Arc::new(StaticFetcher(RobotsFetchOutcomeKind::NotFound)),
        );
        assert!(gate.is_allowed("https://example.test/anything").await);
    }

    #[tokio::test]
    async fn fetch_failure_defaults_to_allowed() {
        let gate = RobotsGate::new(
            RobotsGateConfig::default(),
            Arc::new(StaticFetcher(RobotsFetchOutcomeKind::Failed)),
        );
        assert!(gate.is_allowed("https://example.test/anything").await);
    }

    #[tokio::test]
    async fn respect_robots_false_bypasses_everything() {
        let mut config = RobotsGateConfig::default();
        config.respect_robots = false;
        let gate = RobotsGate::new(config, Arc::new(StaticFetcher(RobotsFetchOutcomeKind::Disallow)));
        assert!(gate.is_allowed("https://example.test/private/page").await);
    }
}
