use crate::config::CrawlConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Seed requests are admitted at this priority.
pub const SEED_PRIORITY: i64 = 10;

/// A single unit of work flowing through the pipeline.
///
/// `configuration` is an opaque `Arc` handle to the active crawl's
/// configuration snapshot; `cancellation_token` is attached by the worker
/// that picks the request up and is a child of the engine's root token so
/// that `Engine::stop` cancels every in-flight request transitively.
#[derive(Clone)]
pub struct CrawlRequest {
    pub url: String,
    pub depth: u32,
    pub priority: i64,
    pub referrer: Option<String>,
    pub retry_count: u32,
    pub configuration: Arc<CrawlConfig>,
    pub cancellation_token: CancellationToken,
}

impl CrawlRequest {
    /// Construct a seed request: depth 0, default seed priority, no referrer.
    pub fn seed(url: impl Into<String>, configuration: Arc<CrawlConfig>, cancellation_token: CancellationToken) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            priority: SEED_PRIORITY,
            referrer: None,
            retry_count: 0,
            configuration,
            cancellation_token,
        }
    }

    /// Construct a request discovered via a link on `referrer`, one depth
    /// deeper and one priority point lower (depth-first bias).
    pub fn discovered(
        url: impl Into<String>,
        referrer: &CrawlRequest,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            url: url.into(),
            depth: referrer.depth + 1,
            priority: referrer.priority - 1,
            referrer: Some(referrer.url.clone()),
            retry_count: 0,
            configuration: referrer.configuration.clone(),
            cancellation_token,
        }
    }

    /// Re-admit this request after a retry decision, with `retry_count`
    /// incremented. Never mutates any other field.
    pub fn into_retry(mut self, delay_applied: bool) -> Self {
        self.retry_count += 1;
        let _ = delay_applied;
        self
    }

    /// Best-effort registered-domain extraction (host minus default port).
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }
}


impl std::fmt::Debug for CrawlRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlRequest")
            .field("url", &self.url)
            .field("depth", &self.depth)
            .field("priority", &self.priority)
            .field("referrer", &self.referrer)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}
