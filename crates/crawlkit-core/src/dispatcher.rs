//! Pipeline stage dispatcher: chain-of-responsibility over pluggable stage
//! implementations, ordered by descending priority.
//!
//! The concrete downloaders/parsers/stores are out-of-scope collaborators;
//! this module only orders and invokes whatever the caller registers,
//! following `crawlkit_types::traits::{Downloader,Parser,Storage}`.

use crawlkit_types::{CrawlError, CrawlRequest, CrawlResult, Downloader, DownloadResult, ErrorKind, ParseResult, Parser, Storage};
use std::sync::Arc;
use tracing::{debug, warn};

fn sorted_by_priority<T: ?Sized>(mut implementations: Vec<Arc<T>>, priority: impl Fn(&T) -> i32) -> Vec<Arc<T>> {
    implementations.sort_by_key(|i| std::cmp::Reverse(priority(i)));
    implementations
}

/// Download-stage chain.
pub struct DownloadDispatcher {
    chain: Vec<Arc<dyn Downloader>>,
}

impl DownloadDispatcher {
    pub fn new(implementations: Vec<Arc<dyn Downloader>>) -> Self {
        Self {
            chain: sorted_by_priority(implementations, |d| d.priority()),
        }
    }

    pub async fn dispatch(&self, request: &CrawlRequest) -> Result<DownloadResult, CrawlError> {
        let mut last_error = None;
        for implementation in &self.chain {
            match implementation.download(request).await {
                Ok(result) if result.is_success && !result.is_empty() => return Ok(result),
                Ok(result) => {
                    debug!(url = %request.url, "downloader yielded empty/unsuccessful result, trying next");
                    last_error = Some(CrawlError::Transient {
                        kind: ErrorKind::from_status(result.status_code),
                        status: Some(result.status_code),
                        message: result.error_message.unwrap_or_else(|| "empty download result".to_string()),
                    });
                }
                Err(e) => {
                    warn!(url = %request.url, error = %e, "downloader failed, trying next");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CrawlError::Permanent {
            kind: ErrorKind::Other,
            status: None,
            message: "no downloader registered".to_string(),
        }))
    }
}

/// Parse-stage chain.
pub struct ParseDispatcher {
    chain: Vec<Arc<dyn Parser>>,
}

impl ParseDispatcher {
    pub fn new(implementations: Vec<Arc<dyn Parser>>) -> Self {
        Self {
            chain: sorted_by_priority(implementations, |p| p.priority()),
        }
    }

    pub async fn dispatch(&self, download: &DownloadResult, request: &CrawlRequest) -> Result<ParseResult, CrawlError> {
        let mut last_error = None;
        for implementation in &self.chain {
            match implementation.parse(download, request).await {
                Ok(result) if result.text_content.is_some() || !result.links.is_empty() => return Ok(result),
                Ok(_) => {
                    debug!(url = %request.url, "parser yielded empty result, trying next");
                }
                Err(e) => {
                    warn!(url = %request.url, error = %e, "parser failed, trying next");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Err(CrawlError::ParseFailed(format!("no parser produced output for {}", request.url))),
        }
    }
}

/// Store-stage chain.
pub struct StoreDispatcher {
    chain: Vec<Arc<dyn Storage>>,
}

impl StoreDispatcher {
    pub fn new(implementations: Vec<Arc<dyn Storage>>) -> Self {
        Self {
            chain: sorted_by_priority(implementations, |s| s.priority()),
        }
    }

    pub async fn dispatch(&self, result: &CrawlResult) -> Result<(), CrawlError> {
        let mut last_error = None;
        for implementation in &self.chain {
            match implementation.save(result).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(url = %result.request.url, error = %e, "storage failed, trying next");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CrawlError::StorageFailed("no storage backend registered".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crawlkit_types::CrawlConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn request() -> CrawlRequest {
        CrawlRequest::seed("https://a.test/", Arc::new(CrawlConfig::default()), CancellationToken::new())
    }

    struct FailingDownloader;
    #[async_trait]
    impl Downloader for FailingDownloader {
        async fn download(&self, request: &CrawlRequest) -> Result<DownloadResult, CrawlError> {
            Err(CrawlError::Transient {
                kind: ErrorKind::Timeout,
                status: None,
                message: format!("timeout fetching {}", request.url),
            })
        }
        fn priority(&self) -> i32 {
            10
        }
    }

    struct DefaultDownloader(Arc<AtomicUsize>);
    #[async_trait]
    impl Downloader for DefaultDownloader {
        async fn download(&self, request: &CrawlRequest) -> Result<DownloadResult, CrawlError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(DownloadResult {
                url: request.url.clone(),
                content: "hello".to_string(),
                raw_bytes: b"hello".to_vec(),
                content_type: Some("text/plain".to_string()),
                status_code: 200,
                download_time_ms: 5,
                is_success: true,
                error_message: None,
            })
        }
        fn priority(&self) -> i32 {
            i32::MIN
        }
    }

    #[tokio::test]
    async fn falls_through_to_default_after_plugin_failure() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let dispatcher = DownloadDispatcher::new(vec![
            Arc::new(FailingDownloader),
            Arc::new(DefaultDownloader(invoked.clone())),
        ]);
        let result = dispatcher.dispatch(&request()).await.unwrap();
        assert!(result.is_success);
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn surfaces_failure_when_every_implementation_fails() {
        let dispatcher = DownloadDispatcher::new(vec![Arc::new(FailingDownloader)]);
        assert!(dispatcher.dispatch(&request()).await.is_err());
    }

    #[tokio::test]
    async fn higher_priority_implementation_tried_first() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let dispatcher = DownloadDispatcher::new(vec![
            Arc::new(DefaultDownloader(invoked.clone())),
            Arc::new(DefaultDownloader(invoked.clone())),
        ]);
        // Both succeed, but only the first in priority order should run.
        dispatcher.dispatch(&request()).await.unwrap();
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }
}
