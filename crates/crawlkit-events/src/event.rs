use chrono::{DateTime, Utc};
use crawlkit_types::CrawlerStatus;

/// The four event kinds the engine emits.
#[derive(Debug, Clone)]
pub enum Event {
    /// A request finished the full pipeline successfully.
    CrawlCompleted {
        url: String,
        depth: u32,
        status_code: u16,
        download_time_ms: u64,
        at: DateTime<Utc>,
    },
    /// A request failed at some stage; `will_retry` reflects the retry
    /// component's decision for this occurrence.
    CrawlError {
        url: String,
        message: String,
        retry_count: u32,
        will_retry: bool,
        at: DateTime<Utc>,
    },
    /// Links were extracted from a page and offered to the frontier.
    UrlDiscovered {
        source_url: String,
        discovered: Vec<String>,
        admitted: usize,
        at: DateTime<Utc>,
    },
    /// The engine's lifecycle status changed.
    CrawlerStatusChanged {
        previous: CrawlerStatus,
        current: CrawlerStatus,
        message: Option<String>,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn completed(url: impl Into<String>, depth: u32, status_code: u16, download_time_ms: u64) -> Self {
        Event::CrawlCompleted {
            url: url.into(),
            depth,
            status_code,
            download_time_ms,
            at: Utc::now(),
        }
    }

    pub fn error(url: impl Into<String>, message: impl Into<String>, retry_count: u32, will_retry: bool) -> Self {
        Event::CrawlError {
            url: url.into(),
            message: message.into(),
            retry_count,
            will_retry,
            at: Utc::now(),
        }
    }

    pub fn discovered(source_url: impl Into<String>, discovered: Vec<String>, admitted: usize) -> Self {
        Event::UrlDiscovered {
            source_url: source_url.into(),
            discovered,
            admitted,
            at: Utc::now(),
        }
    }

    pub fn status_changed(previous: CrawlerStatus, current: CrawlerStatus, message: Option<String>) -> Self {
        Event::CrawlerStatusChanged {
            previous,
            current,
            message,
            at: Utc::now(),
        }
    }
}
