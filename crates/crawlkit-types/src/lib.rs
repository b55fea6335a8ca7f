//! Shared data model and plugin contracts for the crawlkit crawl execution
//! engine: [`CrawlRequest`], the per-stage result types, durable state
//! records, the configuration snapshot, and the traits out-of-scope
//! collaborators (downloaders, parsers, storage, metadata stores, metrics
//! sinks) implement.

pub mod config;
pub mod error;
pub mod request;
pub mod results;
pub mod state;
pub mod traits;

pub use config::CrawlConfig;
pub use error::{CrawlError, ErrorKind, Result};
pub use request::{CrawlRequest, SEED_PRIORITY};
pub use results::{CrawlResult, DownloadResult, ParseResult};
pub use state::{CrawlState, CrawlStatistics, CrawlTotals, CrawlerStatus, UrlState};
pub use traits::{AtomicMetricsSink, Downloader, MetadataStore, MetricsSink, NoopMetricsSink, Parser, Storage};
