use crate::request::CrawlRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Outcome of the download stage for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResult {
    pub url: String,
    pub content: String,
    pub raw_bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// 0 signals a transport-level failure (no response was received).
    pub status_code: u16,
    pub download_time_ms: u64,
    pub is_success: bool,
    pub error_message: Option<String>,
}

impl DownloadResult {
    pub fn failed(url: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: String::new(),
            raw_bytes: Vec::new(),
            content_type: None,
            status_code: 0,
            download_time_ms: 0,
            is_success: false,
            error_message: Some(error_message.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.raw_bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw_bytes.is_empty()
    }
}

/// Outcome of the parse stage for one download.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParseResult {
    pub url: String,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub text_content: Option<String>,
    /// Duplicates tolerated: the frontier performs its own dedup on admission.
    pub links: Vec<String>,
    pub images: Vec<String>,
    pub extracted_data: HashMap<String, Value>,
    pub parse_time_ms: u64,
    pub discovered_urls: usize,
}

/// Immutable record of one fully-processed request, handed to storage.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub request: CrawlRequest,
    pub download_result: DownloadResult,
    pub parse_result: ParseResult,
    pub processed_at: DateTime<Utc>,
}
