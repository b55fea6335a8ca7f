//! Top-level crawl engine: owns the frontier, worker pool, and pipeline,
//! and exposes the start/pause/resume/stop lifecycle plus a builder for
//! wiring up collaborators before a crawl begins.

use crate::dispatcher::{DownloadDispatcher, ParseDispatcher, StoreDispatcher};
use crate::frontier::{Frontier, FrontierConfig};
use crate::pool::{RequestProcessor, WorkerPool, WorkerPoolConfig};
use async_trait::async_trait;
use crawlkit_events::{Event, EventBus, EventHandler};
use crawlkit_reliability::{AntiBotConfig, AntiBotGate, RetryCoordinator, RetryCoordinatorConfig, RobotsFetcher, RobotsGate, RobotsGateConfig};
use crawlkit_types::{
    CrawlConfig, CrawlError, CrawlRequest, CrawlResult, CrawlState, CrawlStatistics, CrawlerStatus, Downloader, MetadataStore,
    MetricsSink, NoopMetricsSink, Parser, Storage,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const STOP_GRACE_PER_WORKER: Duration = Duration::from_secs(30);
const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Resident set size of this process, in megabytes. Backs the
/// `Performance.memory_limit_mb` soft cap.
fn current_memory_usage_mb() -> usize {
    use sysinfo::{Pid, ProcessesToUpdate, System};

    let mut sys = System::new_all();
    sys.refresh_memory();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let pid = std::process::id();
    let Some(process) = sys.process(Pid::from(pid as usize)) else {
        return 0;
    };
    (process.memory() / 1024) as usize // sysinfo returns KB, convert to MB
}

/// Assembles an [`Engine`] from a [`CrawlConfig`] snapshot plus the
/// injected out-of-scope collaborators.
pub struct EngineBuilder {
    config: Arc<CrawlConfig>,
    downloaders: Vec<Arc<dyn Downloader>>,
    parsers: Vec<Arc<dyn Parser>>,
    stores: Vec<Arc<dyn Storage>>,
    metadata: Option<Arc<dyn MetadataStore>>,
    metrics: Arc<dyn MetricsSink>,
    robots_fetcher: Option<Arc<dyn RobotsFetcher>>,
    event_handlers: Vec<Arc<dyn EventHandler>>,
}

impl EngineBuilder {
    pub fn new(config: CrawlConfig) -> Self {
        Self {
            config: Arc::new(config),
            downloaders: Vec::new(),
            parsers: Vec::new(),
            stores: Vec::new(),
            metadata: None,
            metrics: Arc::new(NoopMetricsSink),
            robots_fetcher: None,
            event_handlers: Vec::new(),
        }
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloaders.push(downloader);
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parsers.push(parser);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.stores.push(storage);
        self
    }

    pub fn with_metadata_store(mut self, metadata: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_metrics_sink(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_robots_fetcher(mut self, fetcher: Arc<dyn RobotsFetcher>) -> Self {
        self.robots_fetcher = Some(fetcher);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handlers.push(handler);
        self
    }

    pub fn build(self) -> Result<Engine, CrawlError> {
        let Some(robots_fetcher) = self.robots_fetcher else {
            return Err(CrawlError::Init("no robots fetcher registered".to_string()));
        };
        if self.downloaders.is_empty() {
            return Err(CrawlError::Init("no downloader registered".to_string()));
        }
        if self.parsers.is_empty() {
            return Err(CrawlError::Init("no parser registered".to_string()));
        }
        if self.stores.is_empty() {
            return Err(CrawlError::Init("no storage backend registered".to_string()));
        }

        let events = Arc::new(EventBus::new());
        for handler in self.event_handlers {
            events.subscribe(handler);
        }

        Ok(Engine::new(
            self.config,
            DownloadDispatcher::new(self.downloaders),
            ParseDispatcher::new(self.parsers),
            StoreDispatcher::new(self.stores),
            self.metadata,
            self.metrics,
            RobotsGate::new(RobotsGateConfig::default(), robots_fetcher),
            events,
        ))
    }
}

struct Pipeline {
    config: Arc<CrawlConfig>,
    frontier: Arc<Frontier>,
    download: DownloadDispatcher,
    parse: ParseDispatcher,
    store: StoreDispatcher,
    robots: RobotsGate,
    antibot: AntiBotGate,
    retry: RetryCoordinator,
    metadata: Option<Arc<dyn MetadataStore>>,
    metrics: Arc<dyn MetricsSink>,
    events: Arc<EventBus>,
}

#[async_trait]
impl RequestProcessor for Pipeline {
    async fn process(&self, request: CrawlRequest) {
        if request.depth > self.config.basic.max_depth {
            self.record_rejection(&request, "depth exceeds max_depth");
            return;
        }
        if request.cancellation_token.is_cancelled() {
            return;
        }

        let host = request.host().unwrap_or_else(|| request.url.clone());

        if self.config.basic.respect_robots_txt {
            if !self.robots.is_allowed(&request.url).await {
                self.record_rejection(&request, "blocked by robots.txt");
                return;
            }
            if let Some(delay) = self.robots.crawl_delay(&host).await {
                self.frontier.set_domain_interval(&host, Duration::from_secs_f64(delay));
            }
        }
        if self.config.anti_bot.enable_detection && !self.antibot.should_process(&request.url) {
            self.record_rejection(&request, "rejected by anti-bot gate");
            return;
        }

        let download = match self.download.dispatch(&request).await {
            Ok(d) => d,
            Err(e) => {
                self.handle_failure(&request, &host, e).await;
                return;
            }
        };
        self.frontier
            .record_domain_performance(&host, download.download_time_ms, download.is_success);

        let parsed = match self.parse.dispatch(&download, &request).await {
            Ok(p) => p,
            Err(e) => {
                self.handle_failure(&request, &host, e).await;
                return;
            }
        };

        let result = CrawlResult {
            request: request.clone(),
            download_result: download.clone(),
            parse_result: parsed.clone(),
            processed_at: chrono::Utc::now(),
        };
        let store_start = tokio::time::Instant::now();
        if let Err(e) = self.store.dispatch(&result).await {
            self.handle_failure(&request, &host, e).await;
            return;
        }
        let storage_ms = store_start.elapsed().as_millis() as f64;

        self.retry.record_success(&host).await;
        self.record_success_metrics(&host, download.status_code, download.len(), download.download_time_ms as f64, parsed.parse_time_ms as f64, storage_ms);
        self.save_url_state(&request, Some(&download), None).await;

        if !parsed.links.is_empty() && request.depth < self.config.basic.max_depth {
            let children: Vec<CrawlRequest> = parsed
                .links
                .iter()
                .map(|link| CrawlRequest::discovered(link.clone(), &request, request.cancellation_token.clone()))
                .collect();
            let admitted = self.frontier.add_many(children).await;
            self.events.emit(Event::discovered(request.url.clone(), parsed.links.clone(), admitted));
        }

        self.events.emit(Event::completed(
            request.url.clone(),
            request.depth,
            download.status_code,
            download.download_time_ms,
        ));
    }
}

impl Pipeline {
    fn labels(&self, host: &str, status_code: u16) -> std::collections::HashMap<String, String> {
        std::collections::HashMap::from([
            ("domain".to_string(), host.to_string()),
            ("status_code".to_string(), status_code.to_string()),
        ])
    }

    fn record_success_metrics(&self, host: &str, status_code: u16, bytes: usize, download_ms: f64, parse_ms: f64, storage_ms: f64) {
        let labels = self.labels(host, status_code);
        self.metrics.incr_counter("urls_processed", &labels, 1);
        self.metrics.incr_counter("bytes_downloaded", &labels, bytes as u64);
        self.metrics.observe_histogram("download_duration_ms", &labels, download_ms);
        self.metrics.observe_histogram("parse_duration_ms", &labels, parse_ms);
        self.metrics.observe_histogram("storage_duration_ms", &labels, storage_ms);
    }

    fn record_rejection(&self, request: &CrawlRequest, reason: &str) {
        self.frontier.record_skipped();
        self.events.emit(Event::error(request.url.clone(), reason.to_string(), request.retry_count, false));
    }

    async fn handle_failure(&self, request: &CrawlRequest, host: &str, error: CrawlError) {
        let kind = error.kind().unwrap_or(crawlkit_types::ErrorKind::Other);
        self.retry.record_error(host, kind).await;
        let (should_retry, delay_ms) = self.retry.should_retry(host, kind, request.retry_count).await;

        let mut labels = self.labels(host, 0);
        labels.insert("error_kind".to_string(), format!("{kind:?}"));
        self.metrics.incr_counter("urls_failed", &labels, 1);

        self.events
            .emit(Event::error(request.url.clone(), error.to_string(), request.retry_count, should_retry));
        self.save_url_state(request, None, Some(error.to_string())).await;

        if should_retry {
            let retried = request.clone().into_retry(delay_ms > 0);
            let frontier = self.frontier.clone();
            let cancel = request.cancellation_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                        frontier.add(retried).await;
                    }
                }
            });
        } else {
            self.frontier.record_domain_performance(host, 0, false);
        }
    }

    /// Persist the per-URL bookkeeping record, preserving `discovered_at`
    /// from any prior record for this URL.
    async fn save_url_state(&self, request: &CrawlRequest, download: Option<&crawlkit_types::DownloadResult>, error_message: Option<String>) {
        let Some(metadata) = &self.metadata else {
            return;
        };
        let mut state = match metadata.get_url_state(&request.url).await {
            Ok(Some(existing)) => existing,
            Ok(None) => crawlkit_types::UrlState::discovered(request.url.clone()),
            Err(e) => {
                warn!(error = %e, url = %request.url, "failed to load prior url state");
                crawlkit_types::UrlState::discovered(request.url.clone())
            }
        };
        state.processed_at = Some(chrono::Utc::now());
        state.retry_count = request.retry_count;
        if let Some(download) = download {
            state.status_code = Some(download.status_code);
            state.content_length = Some(download.len());
            state.content_type = download.content_type.clone();
            state.download_time_ms = Some(download.download_time_ms);
        }
        state.error_message = error_message;
        if let Err(e) = metadata.save_url_state(&state).await {
            warn!(error = %e, url = %request.url, "failed to persist url state");
        }
    }
}

/// Orchestrates the frontier, worker pool, and pipeline stages through a
/// `CrawlerStatus` state machine.
pub struct Engine {
    config: Arc<CrawlConfig>,
    status: RwLock<CrawlerStatus>,
    frontier: Arc<Frontier>,
    pipeline: Arc<Pipeline>,
    pool: Mutex<Option<Arc<WorkerPool>>>,
    metadata: Option<Arc<dyn MetadataStore>>,
    events: Arc<EventBus>,
    state: Arc<RwLock<CrawlState>>,
    cancel: CancellationToken,
    stats_task: Mutex<Option<JoinHandle<()>>>,
    stopping_from_auto_stop: Arc<AtomicBool>,
}

impl Engine {
    fn new(
        config: Arc<CrawlConfig>,
        download: DownloadDispatcher,
        parse: ParseDispatcher,
        store: StoreDispatcher,
        metadata: Option<Arc<dyn MetadataStore>>,
        metrics: Arc<dyn MetricsSink>,
        robots: RobotsGate,
        events: Arc<EventBus>,
    ) -> Self {
        let frontier = Arc::new(Frontier::new(FrontierConfig {
            max_queue_size: config.performance.max_queue_size,
            allowed_domains: config.domains.allowed_domains.clone(),
            blocked_patterns: config.domains.blocked_patterns.clone(),
            min_request_interval: config.basic.request_delay,
        }));

        let pipeline = Arc::new(Pipeline {
            config: config.clone(),
            frontier: frontier.clone(),
            download,
            parse,
            store,
            robots,
            antibot: AntiBotGate::new(AntiBotConfig::default()),
            retry: RetryCoordinator::new(RetryCoordinatorConfig {
                base_max_retries: config.anti_bot.retry_policy.max_retries,
            }),
            metadata: metadata.clone(),
            metrics,
            events: events.clone(),
        });

        let state = CrawlState::new(uuid::Uuid::new_v4().to_string(), config.clone());

        Self {
            config,
            status: RwLock::new(CrawlerStatus::Idle),
            frontier,
            pipeline,
            pool: Mutex::new(None),
            metadata,
            events,
            state: Arc::new(RwLock::new(state)),
            cancel: CancellationToken::new(),
            stats_task: Mutex::new(None),
            stopping_from_auto_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn current_state(&self) -> CrawlState {
        self.state.read().clone()
    }

    pub fn statistics(&self) -> CrawlStatistics {
        self.state.read().statistics.clone()
    }

    /// Whether the auto-scaler or `max_pages` ceiling has asked for a
    /// stop. The caller is responsible for driving
    /// the actual `stop()` call; the engine only raises the signal since
    /// it does not own a handle to itself to call `stop` from within a
    /// spawned task.
    pub fn auto_stop_requested(&self) -> bool {
        self.stopping_from_auto_stop.load(Ordering::SeqCst)
    }

    fn transition(&self, to: CrawlerStatus, message: Option<String>) -> bool {
        let mut status = self.status.write();
        if !status.can_transition_to(to) {
            return false;
        }
        let previous = *status;
        if previous == to {
            // Re-entering the same status (e.g. pause() while already
            // Paused) is a no-op: no event, no state write.
            return true;
        }
        *status = to;
        drop(status);
        self.state.write().status = to;
        self.events.emit(Event::status_changed(previous, to, message));
        true
    }

    /// Admit seed requests at priority 10, depth 0.
    pub async fn add_seeds(&self, urls: Vec<String>) -> usize {
        let mut admitted = 0;
        for url in urls {
            let request = CrawlRequest::seed(url, self.config.clone(), self.cancel.child_token());
            if self.frontier.add(request).await {
                admitted += 1;
            }
        }
        admitted
    }

    /// Initialize subsystems and spawn the worker pool, auto-scaler, and
    /// periodic statistics writer.
    pub async fn start(&self) -> Result<(), CrawlError> {
        if !self.transition(CrawlerStatus::Running, None) {
            return Err(CrawlError::Init(format!(
                "cannot start from status {:?}",
                *self.status.read()
            )));
        }

        if let Some(metadata) = &self.metadata {
            if let Err(e) = metadata.save_crawl_state(&self.current_state()).await {
                warn!(error = %e, "failed to persist initial crawl state");
            }
        }

        let pool = Arc::new(WorkerPool::new(
            WorkerPoolConfig {
                min_workers: self.config.basic.max_concurrent_tasks.max(1),
                ..WorkerPoolConfig::default()
            },
            self.frontier.clone(),
            self.pipeline.clone(),
            self.cancel.clone(),
        ));
        pool.start().await;
        *self.pool.lock().await = Some(pool.clone());

        let stats_interval = Duration::from_secs(self.config.monitoring.metrics_interval_seconds.max(1));
        let stats_interval = if self.config.monitoring.enable_metrics {
            stats_interval
        } else {
            DEFAULT_STATS_INTERVAL
        };
        *self.stats_task.lock().await = Some(self.spawn_statistics_writer(stats_interval, pool));

        Ok(())
    }

    fn spawn_statistics_writer(&self, interval: Duration, pool: Arc<WorkerPool>) -> JoinHandle<()> {
        let frontier = self.frontier.clone();
        let metadata = self.metadata.clone();
        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let stopping_from_auto_stop = self.stopping_from_auto_stop.clone();
        let max_pages = self.config.basic.max_pages;
        let memory_limit_mb = self.config.performance.memory_limit_mb;
        let paused_for_memory = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let counters = frontier.counters();
                let snapshot = {
                    let mut guard = state.write();
                    guard.statistics.urls_processed = counters.processed;
                    guard.statistics.urls_failed = counters.errors;
                    guard.statistics.urls_skipped = counters.skipped;
                    guard.totals.processed = counters.processed;
                    guard.totals.errors = counters.errors;
                    guard.totals.skipped = counters.skipped;
                    guard.clone()
                };
                // Non-fatal on failure: a missed periodic snapshot
                // doesn't interrupt the crawl.
                if let Some(metadata) = &metadata {
                    if let Err(e) = metadata.save_crawl_state(&snapshot).await {
                        error!(error = %e, "failed to persist periodic statistics");
                    }
                }

                if memory_limit_mb > 0 {
                    let usage_mb = current_memory_usage_mb();
                    if usage_mb >= memory_limit_mb && !pool.is_paused() {
                        warn!(usage_mb, memory_limit_mb, "memory limit exceeded, pausing worker pool");
                        pool.pause();
                        paused_for_memory.store(true, Ordering::SeqCst);
                    } else if usage_mb < memory_limit_mb && paused_for_memory.swap(false, Ordering::SeqCst) {
                        info!(usage_mb, memory_limit_mb, "memory usage back under limit, resuming worker pool");
                        pool.resume();
                    }
                }

                if let Some(limit) = max_pages {
                    if counters.processed >= limit {
                        stopping_from_auto_stop.store(true, Ordering::SeqCst);
                        break;
                    }
                }
                if pool.auto_stop_requested() {
                    stopping_from_auto_stop.store(true, Ordering::SeqCst);
                    break;
                }
            }
        })
    }

    pub fn pause(&self) {
        if self.transition(CrawlerStatus::Paused, None) {
            if let Some(pool) = self.pool.try_lock().ok().and_then(|p| p.clone()) {
                pool.pause();
            }
        }
    }

    pub fn resume(&self) {
        if self.transition(CrawlerStatus::Running, None) {
            if let Some(pool) = self.pool.try_lock().ok().and_then(|p| p.clone()) {
                pool.resume();
            }
        }
    }

    /// Cancel, drain workers with a bounded deadline, shut down
    /// subsystems in reverse order, and persist final state.
    pub async fn stop(&self, save_state: bool) -> Result<(), CrawlError> {
        self.transition(CrawlerStatus::Stopping, None);
        self.cancel.cancel();

        if let Some(task) = self.stats_task.lock().await.take() {
            task.abort();
        }
        if let Some(pool) = self.pool.lock().await.take() {
            pool.stop(STOP_GRACE_PER_WORKER).await;
        }

        {
            let mut state = self.state.write();
            state.end_time = Some(chrono::Utc::now());
        }

        if save_state {
            if let Some(metadata) = &self.metadata {
                if let Err(e) = metadata.save_crawl_state(&self.current_state()).await {
                    warn!(error = %e, "failed to persist final crawl state");
                }
            }
        }

        self.transition(CrawlerStatus::Idle, None);
        info!("engine stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlkit_reliability::{RobotsFetchOutcome, RobotsFetcher};
    use crawlkit_types::{DownloadResult, ParseResult};
    use std::sync::atomic::AtomicUsize;

    struct AllowAllRobots;
    #[async_trait]
    impl RobotsFetcher for AllowAllRobots {
        async fn fetch(&self, _origin: &str) -> RobotsFetchOutcome {
            RobotsFetchOutcome::NotFound
        }
    }

    struct StubDownloader;
    #[async_trait]
    impl Downloader for StubDownloader {
        async fn download(&self, request: &CrawlRequest) -> Result<DownloadResult, CrawlError> {
            Ok(DownloadResult {
                url: request.url.clone(),
                content: "<html></html>".to_string(),
                raw_bytes: b"<html></html>".to_vec(),
                content_type: Some("text/html".to_string()),
                status_code: 200,
                download_time_ms: 5,
                is_success: true,
                error_message: None,
            })
        }
    }

    struct LinkingParser {
        links: Vec<String>,
    }
    #[async_trait]
    impl Parser for LinkingParser {
        async fn parse(&self, download: &DownloadResult, _request: &CrawlRequest) -> Result<ParseResult, CrawlError> {
            Ok(ParseResult {
                url: download.url.clone(),
                content_type: download.content_type.clone(),
                title: None,
                text_content: Some("hello".to_string()),
                links: self.links.clone(),
                images: Vec::new(),
                extracted_data: Default::default(),
                parse_time_ms: 1,
                discovered_urls: self.links.len(),
            })
        }
    }

    struct CountingStorage(Arc<AtomicUsize>);
    #[async_trait]
    impl Storage for CountingStorage {
        async fn save(&self, _result: &CrawlResult) -> Result<(), CrawlError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn builder() -> EngineBuilder {
        EngineBuilder::new(CrawlConfig::default())
            .with_robots_fetcher(Arc::new(AllowAllRobots))
            .with_downloader(Arc::new(StubDownloader))
            .with_parser(Arc::new(LinkingParser { links: Vec::new() }))
    }

    #[test]
    fn build_fails_without_a_robots_fetcher() {
        let result = EngineBuilder::new(CrawlConfig::default())
            .with_downloader(Arc::new(StubDownloader))
            .with_parser(Arc::new(LinkingParser { links: Vec::new() }))
            .with_storage(Arc::new(CountingStorage(Arc::new(AtomicUsize::new(0)))))
            .build();
        assert!(matches!(result, Err(CrawlError::Init(_))));
    }

    #[test]
    fn build_fails_without_a_downloader() {
        let result = EngineBuilder::new(CrawlConfig::default())
            .with_robots_fetcher(Arc::new(AllowAllRobots))
            .with_parser(Arc::new(LinkingParser { links: Vec::new() }))
            .with_storage(Arc::new(CountingStorage(Arc::new(AtomicUsize::new(0)))))
            .build();
        assert!(matches!(result, Err(CrawlError::Init(_))));
    }

    #[test]
    fn build_succeeds_with_every_required_collaborator() {
        let counter = Arc::new(AtomicUsize::new(0));
        let result = builder().with_storage(Arc::new(CountingStorage(counter))).build();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn idle_engine_reports_idle_status() {
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = builder().with_storage(Arc::new(CountingStorage(counter))).build().unwrap();
        assert_eq!(engine.current_state().status, CrawlerStatus::Idle);
    }

    #[tokio::test]
    async fn start_transitions_to_running_and_processes_seeds() {
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = builder().with_storage(Arc::new(CountingStorage(counter.clone()))).build().unwrap();

        engine.add_seeds(vec!["https://a.test/".to_string()]).await;
        engine.start().await.unwrap();
        assert_eq!(engine.current_state().status, CrawlerStatus::Running);

        for _ in 0..50 {
            if counter.load(Ordering::SeqCst) >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        engine.stop(false).await.unwrap();
        assert_eq!(engine.current_state().status, CrawlerStatus::Idle);
    }

    #[tokio::test]
    async fn discovered_links_are_admitted_to_the_frontier() {
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = EngineBuilder::new(CrawlConfig::default())
            .with_robots_fetcher(Arc::new(AllowAllRobots))
            .with_downloader(Arc::new(StubDownloader))
            .with_parser(Arc::new(LinkingParser {
                links: vec!["https://a.test/child".to_string()],
            }))
            .with_storage(Arc::new(CountingStorage(counter.clone())))
            .build()
            .unwrap();

        engine.add_seeds(vec!["https://a.test/".to_string()]).await;
        engine.start().await.unwrap();

        for _ in 0..50 {
            if counter.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        engine.stop(false).await.unwrap();
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_status() {
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = builder().with_storage(Arc::new(CountingStorage(counter))).build().unwrap();
        engine.start().await.unwrap();

        engine.pause();
        assert_eq!(engine.current_state().status, CrawlerStatus::Paused);

        engine.resume();
        assert_eq!(engine.current_state().status, CrawlerStatus::Running);

        engine.stop(false).await.unwrap();
    }

    #[tokio::test]
    async fn cannot_pause_from_idle() {
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = builder().with_storage(Arc::new(CountingStorage(counter))).build().unwrap();
        engine.pause();
        assert_eq!(engine.current_state().status, CrawlerStatus::Idle);
    }

    #[tokio::test]
    async fn repeated_pause_while_already_paused_emits_no_status_event() {
        let counter = Arc::new(AtomicUsize::new(0));
        let status_events = Arc::new(AtomicUsize::new(0));
        let handler_events = status_events.clone();
        let engine = EngineBuilder::new(CrawlConfig::default())
            .with_robots_fetcher(Arc::new(AllowAllRobots))
            .with_downloader(Arc::new(StubDownloader))
            .with_parser(Arc::new(LinkingParser { links: Vec::new() }))
            .with_storage(Arc::new(CountingStorage(counter)))
            .with_event_handler(Arc::new(move |event: &Event| {
                if matches!(event, Event::CrawlerStatusChanged { .. }) {
                    handler_events.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .build()
            .unwrap();
        engine.start().await.unwrap();

        engine.pause();
        let after_first_pause = status_events.load(Ordering::SeqCst);
        engine.pause();
        assert_eq!(status_events.load(Ordering::SeqCst), after_first_pause);
        assert_eq!(engine.current_state().status, CrawlerStatus::Paused);

        engine.stop(false).await.unwrap();
    }

    #[tokio::test]
    async fn disabling_anti_bot_detection_skips_the_gate() {
        let mut config = CrawlConfig::default();
        config.anti_bot.enable_detection = false;
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = EngineBuilder::new(config)
            .with_robots_fetcher(Arc::new(AllowAllRobots))
            .with_downloader(Arc::new(StubDownloader))
            .with_parser(Arc::new(LinkingParser { links: Vec::new() }))
            .with_storage(Arc::new(CountingStorage(counter.clone())))
            .build()
            .unwrap();

        // A honeypot-matching URL would normally be rejected by the
        // anti-bot gate; with detection disabled it reaches the downloader.
        engine.add_seeds(vec!["https://a.test/trap/".to_string()]).await;
        engine.start().await.unwrap();

        for _ in 0..50 {
            if counter.load(Ordering::SeqCst) >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        engine.stop(false).await.unwrap();
    }
}
