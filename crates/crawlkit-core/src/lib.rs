//! Crawl execution engine: frontier, pipeline dispatcher, worker pool,
//! and orchestrator built on top of `crawlkit-reliability`'s retry/robots/
//! anti-bot gates and `crawlkit-events`' event bus.

mod dispatcher;
mod engine;
mod frontier;
mod pool;

pub use dispatcher::{DownloadDispatcher, ParseDispatcher, StoreDispatcher};
pub use engine::{Engine, EngineBuilder};
pub use frontier::{Frontier, FrontierConfig, FrontierCounters};
pub use pool::{RequestProcessor, WorkerPool, WorkerPoolConfig};
