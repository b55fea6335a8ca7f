//! Worker pool and auto-scaler: a pool of async workers pulling from the
//! frontier, with a periodic task that grows or shrinks the pool against
//! queue-depth watermarks.

use crate::frontier::Frontier;
use async_trait::async_trait;
use crawlkit_types::CrawlRequest;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const HIGH_WATERMARK: usize = 50;
const LOW_WATERMARK: usize = 10;
const IDLE_POLL: Duration = Duration::from_millis(500);
const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Processes one request end to end (robots/anti-bot gates, download,
/// parse, store, child enqueue); supplied by the engine.
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    async fn process(&self, request: CrawlRequest);
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub thread_adjust_interval: Duration,
    pub enable_auto_stop: bool,
    pub auto_stop_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: (num_cpus::get() * 4).max(1),
            thread_adjust_interval: Duration::from_secs(5),
            enable_auto_stop: true,
            auto_stop_timeout: Duration::from_secs(30),
        }
    }
}

/// Shared handles every worker task needs; cloned into each spawned task
/// and into the auto-scaler task so new workers can be started from
/// either place without borrowing the pool itself.
#[derive(Clone)]
struct SharedContext {
    frontier: Arc<Frontier>,
    processor: Arc<dyn RequestProcessor>,
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    pause_notify: Arc<Notify>,
    pending_removals: Arc<AtomicUsize>,
}

fn spawn_one_worker(id: usize, ctx: SharedContext) -> JoinHandle<()> {
    tokio::spawn(async move { worker_loop(id, ctx).await })
}

/// A fixed-to-elastic set of tokio tasks pulling from a shared [`Frontier`].
pub struct WorkerPool {
    config: WorkerPoolConfig,
    ctx: SharedContext,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    next_worker_id: Arc<AtomicUsize>,
    auto_stop_requested: Arc<AtomicBool>,
    empty_since_ms: Arc<AtomicI64>,
    scaler_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        frontier: Arc<Frontier>,
        processor: Arc<dyn RequestProcessor>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            ctx: SharedContext {
                frontier,
                processor,
                cancel,
                paused: Arc::new(AtomicBool::new(false)),
                pause_notify: Arc::new(Notify::new()),
                pending_removals: Arc::new(AtomicUsize::new(0)),
            },
            workers: Arc::new(Mutex::new(Vec::new())),
            next_worker_id: Arc::new(AtomicUsize::new(0)),
            auto_stop_requested: Arc::new(AtomicBool::new(false)),
            empty_since_ms: Arc::new(AtomicI64::new(-1)),
            scaler_handle: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        for _ in 0..self.config.min_workers {
            let id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
            workers.push(spawn_one_worker(id, self.ctx.clone()));
        }
        drop(workers);

        *self.scaler_handle.lock().await = Some(self.spawn_auto_scaler());
    }

    pub fn pause(&self) {
        self.ctx.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.ctx.paused.store(false, Ordering::SeqCst);
        self.ctx.pause_notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.ctx.paused.load(Ordering::SeqCst)
    }

    pub async fn active_worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Whether the auto-scaler has observed an empty queue for at least
    /// `auto_stop_timeout`; the engine polls this to drive `Stopping`.
    pub fn auto_stop_requested(&self) -> bool {
        self.auto_stop_requested.load(Ordering::SeqCst)
    }

    /// Cancel the shared token and join every worker, up to `grace`.
    pub async fn stop(&self, grace: Duration) {
        self.ctx.cancel.cancel();
        if let Some(scaler) = self.scaler_handle.lock().await.take() {
            scaler.abort();
        }
        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        let join_all = futures::future::join_all(handles.into_iter().map(|h| async move {
            let _ = h.await;
        }));
        if tokio::time::timeout(grace, join_all).await.is_err() {
            warn!("worker pool did not finish within the stop grace period, abandoning stragglers");
        }
    }

    fn spawn_auto_scaler(&self) -> JoinHandle<()> {
        let config = self.config.clone();
        let ctx = self.ctx.clone();
        let workers = self.workers.clone();
        let next_worker_id = self.next_worker_id.clone();
        let auto_stop_requested = self.auto_stop_requested.clone();
        let empty_since_ms = self.empty_since_ms.clone();
        let cancel = self.ctx.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(config.thread_adjust_interval) => {}
                }

                let queue_length = ctx.frontier.counters().queued as usize;
                let mut workers = workers.lock().await;
                let worker_count = workers.len();

                if queue_length > HIGH_WATERMARK && worker_count < config.max_workers {
                    let to_add = (config.max_workers - worker_count).min((queue_length / 10).max(1));
                    info!(queue_length, worker_count, to_add, "scaling workers up");
                    for _ in 0..to_add {
                        let id = next_worker_id.fetch_add(1, Ordering::SeqCst);
                        workers.push(spawn_one_worker(id, ctx.clone()));
                    }
                } else if queue_length < LOW_WATERMARK && worker_count > config.min_workers {
                    let removable = (worker_count - config.min_workers).min(2);
                    if removable > 0 {
                        debug!(queue_length, worker_count, removable, "scheduling workers for removal");
                        ctx.pending_removals.fetch_add(removable, Ordering::SeqCst);
                    }
                }
                drop(workers);

                if config.enable_auto_stop {
                    if queue_length == 0 {
                        let now_ms = now_millis();
                        let started = empty_since_ms.load(Ordering::SeqCst);
                        if started < 0 {
                            empty_since_ms.store(now_ms, Ordering::SeqCst);
                        } else if now_ms - started >= config.auto_stop_timeout.as_millis() as i64 {
                            auto_stop_requested.store(true, Ordering::SeqCst);
                        }
                    } else {
                        empty_since_ms.store(-1, Ordering::SeqCst);
                    }
                }
            }
        })
    }
}

fn now_millis() -> i64 {
    // tokio::time::Instant has no epoch; callers only ever compare two
    // readings taken through this same function within one process, so an
    // arbitrary first-call origin is fine (and stays valid under
    // `tokio::time::pause`/`advance` in tests).
    static EPOCH: std::sync::OnceLock<tokio::time::Instant> = std::sync::OnceLock::new();
    let epoch = *EPOCH.get_or_init(tokio::time::Instant::now);
    tokio::time::Instant::now().saturating_duration_since(epoch).as_millis() as i64
}

async fn worker_loop(id: usize, ctx: SharedContext) {
    debug!(worker_id = id, "worker starting");
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        if ctx.paused.load(Ordering::SeqCst) {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                _ = ctx.pause_notify.notified() => {}
                _ = sleep(PAUSE_POLL) => {}
            }
            continue;
        }

        let next = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            req = ctx.frontier.next() => req,
        };

        match next {
            Some(request) => {
                ctx.processor.process(request).await;
            }
            None => {
                let pending = ctx.pending_removals.load(Ordering::SeqCst);
                if pending > 0
                    && ctx
                        .pending_removals
                        .compare_exchange(pending, pending - 1, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                {
                    debug!(worker_id = id, "exiting to satisfy scheduled removal");
                    break;
                }
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    _ = sleep(IDLE_POLL) => {}
                }
            }
        }
    }
    debug!(worker_id = id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontier::FrontierConfig;
    use crawlkit_types::CrawlConfig;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct CountingProcessor(Arc<StdAtomicUsize>);
    #[async_trait]
    impl RequestProcessor for CountingProcessor {
        async fn process(&self, _request: CrawlRequest) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn workers_drain_the_frontier() {
        let frontier = Arc::new(Frontier::new(FrontierConfig::default()));
        let cfg = Arc::new(CrawlConfig::default());
        for i in 0..5 {
            frontier
                .add(CrawlRequest::seed(format!("https://h{i}.test/"), cfg.clone(), CancellationToken::new()))
                .await;
        }

        let processed = Arc::new(StdAtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(
            WorkerPoolConfig {
                min_workers: 2,
                ..WorkerPoolConfig::default()
            },
            frontier.clone(),
            Arc::new(CountingProcessor(processed.clone())),
            cancel.clone(),
        );
        pool.start().await;

        for _ in 0..50 {
            if processed.load(Ordering::SeqCst) == 5 {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(processed.load(Ordering::SeqCst), 5);

        pool.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn pause_stops_new_work_until_resumed() {
        let frontier = Arc::new(Frontier::new(FrontierConfig::default()));
        let cfg = Arc::new(CrawlConfig::default());
        frontier
            .add(CrawlRequest::seed("https://a.test/", cfg.clone(), CancellationToken::new()))
            .await;

        let processed = Arc::new(StdAtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(
            WorkerPoolConfig {
                min_workers: 1,
                ..WorkerPoolConfig::default()
            },
            frontier.clone(),
            Arc::new(CountingProcessor(processed.clone())),
            cancel.clone(),
        );
        pool.pause();
        pool.start().await;

        sleep(Duration::from_millis(150)).await;
        assert_eq!(processed.load(Ordering::SeqCst), 0);

        pool.resume();
        for _ in 0..50 {
            if processed.load(Ordering::SeqCst) == 1 {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(processed.load(Ordering::SeqCst), 1);

        pool.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn stop_cancels_and_joins_workers_promptly() {
        let frontier = Arc::new(Frontier::new(FrontierConfig::default()));
        let processed = Arc::new(StdAtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(
            WorkerPoolConfig {
                min_workers: 3,
                ..WorkerPoolConfig::default()
            },
            frontier,
            Arc::new(CountingProcessor(processed)),
            cancel,
        );
        pool.start().await;
        assert_eq!(pool.active_worker_count().await, 3);

        let started = tokio::time::Instant::now();
        pool.stop(Duration::from_secs(1)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
