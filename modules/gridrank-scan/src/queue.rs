//! Per-engine task queues with throttle-aware workers.
//!
//! Each engine gets its own priority queue and at most one worker task at a
//! time. Workers pause — rather than spin — when their engine is throttled,
//! blocked, or the shared google reputation group has spent its combined
//! daily budget, and a one-shot retry timer re-kicks processing a minute
//! later. `stop` drains the queues; in-flight tasks run to completion.

use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use gridrank_common::types::GeoPoint;
use gridrank_engines::EngineRegistry;

/// Combined daily request budget for the google reputation group.
pub const GOOGLE_GROUP_DAILY_CAP: u32 = 200;

const RETRY_DELAY_SECS: u64 = 60;

/// Reads the summed `requests_today` for a named reputation group.
/// Installed by the enclosing application at startup.
pub type GroupDailyTotal = Arc<dyn Fn(&str) -> u32 + Send + Sync>;

/// One unit of work: a single query at a single grid point.
#[derive(Debug, Clone)]
pub struct ScanTask {
    pub scan_id: Uuid,
    pub scan_point_id: Uuid,
    pub engine_id: String,
    pub keyword: String,
    pub point: GeoPoint,
    pub city: Option<String>,
    pub state: Option<String>,
    pub priority: u8,
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Process one task. Failures must be recorded on the task's scan point
    /// by the handler itself; the worker only logs them.
    async fn handle(&self, task: &ScanTask) -> Result<()>;
}

/// Heap entry: higher priority first, FIFO within a priority.
struct QueuedTask {
    task: ScanTask,
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.priority == other.task.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueInner {
    queues: HashMap<String, BinaryHeap<QueuedTask>>,
    workers: HashMap<String, JoinHandle<()>>,
    retry_timers: HashMap<String, JoinHandle<()>>,
    stopped: bool,
    seq: u64,
}

#[derive(Clone)]
pub struct ScanQueue {
    inner: Arc<Mutex<QueueInner>>,
    registry: Arc<EngineRegistry>,
    group_daily_total: GroupDailyTotal,
    handler: Arc<Mutex<Option<Arc<dyn TaskHandler>>>>,
}

impl ScanQueue {
    pub fn new(registry: Arc<EngineRegistry>, group_daily_total: GroupDailyTotal) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner::default())),
            registry,
            group_daily_total,
            handler: Arc::new(Mutex::new(None)),
        }
    }

    /// Install the task handler. Must happen before the first enqueue.
    pub fn set_handler(&self, handler: Arc<dyn TaskHandler>) {
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    /// Push tasks into their per-engine queues and kick idle workers.
    pub fn enqueue_batch(&self, tasks: Vec<ScanTask>) {
        {
            let mut inner = self.lock();
            if inner.stopped {
                warn!(count = tasks.len(), "Queue stopped; dropping enqueue");
                return;
            }
            for task in tasks {
                inner.seq += 1;
                let seq = inner.seq;
                inner
                    .queues
                    .entry(task.engine_id.clone())
                    .or_default()
                    .push(QueuedTask { task, seq });
            }
        }
        self.ensure_processing();
    }

    /// Start a worker for every engine with queued work and no live worker.
    /// Idempotent; safe to call from anywhere.
    pub fn ensure_processing(&self) {
        let mut inner = self.lock();
        if inner.stopped {
            return;
        }

        let idle: Vec<String> = inner
            .queues
            .iter()
            .filter(|(engine_id, queue)| {
                !queue.is_empty()
                    && inner
                        .workers
                        .get(*engine_id)
                        .map(|handle| handle.is_finished())
                        .unwrap_or(true)
            })
            .map(|(engine_id, _)| engine_id.clone())
            .collect();

        for engine_id in idle {
            let queue = self.clone();
            let id = engine_id.clone();
            let handle = tokio::spawn(async move { queue.run_worker(id).await });
            inner.workers.insert(engine_id, handle);
        }
    }

    /// Drain all queues, cancel retry timers, and wait for workers to exit.
    /// In-flight tasks finish; nothing new is dispatched.
    pub async fn stop(&self) {
        let (workers, timers) = {
            let mut inner = self.lock();
            inner.stopped = true;
            inner.queues.clear();
            let timers: Vec<JoinHandle<()>> = inner.retry_timers.drain().map(|(_, h)| h).collect();
            let workers: Vec<JoinHandle<()>> = inner.workers.drain().map(|(_, h)| h).collect();
            (workers, timers)
        };
        for timer in timers {
            timer.abort();
        }
        for worker in workers {
            let _ = worker.await;
        }
        info!("Scan queue stopped");
    }

    pub fn queue_depth(&self, engine_id: &str) -> usize {
        self.lock()
            .queues
            .get(engine_id)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    pub fn total_depth(&self) -> usize {
        self.lock().queues.values().map(|q| q.len()).sum()
    }

    /// Engines with a live worker right now.
    pub fn processing_engines(&self) -> Vec<String> {
        let inner = self.lock();
        let mut engines: Vec<String> = inner
            .workers
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(engine_id, _)| engine_id.clone())
            .collect();
        engines.sort();
        engines
    }

    pub fn is_processing(&self, engine_id: &str) -> bool {
        self.lock()
            .workers
            .get(engine_id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn has_retry_timer(&self, engine_id: &str) -> bool {
        self.lock()
            .retry_timers
            .get(engine_id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stopped(&self) -> bool {
        self.lock().stopped
    }

    fn pop_task(&self, engine_id: &str) -> Option<ScanTask> {
        self.lock()
            .queues
            .get_mut(engine_id)
            .and_then(|q| q.pop())
            .map(|entry| entry.task)
    }

    fn current_handler(&self) -> Option<Arc<dyn TaskHandler>> {
        self.handler.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn run_worker(
        self,
        engine_id: String,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(self.run_worker_inner(engine_id))
    }

    async fn run_worker_inner(self, engine_id: String) {
        let paused_reason = loop {
            if self.stopped() {
                break None;
            }

            let Some(engine) = self.registry.get(&engine_id) else {
                warn!(engine = %engine_id, "Unknown engine; dropping its queue");
                self.lock().queues.remove(&engine_id);
                break None;
            };

            if !engine.can_make_request() {
                break Some(engine.status().to_string());
            }

            if let Some(group) = engine.config().reputation_group.as_deref() {
                if group == "google" && (self.group_daily_total)(group) >= GOOGLE_GROUP_DAILY_CAP {
                    break Some("daily_group_cap".to_string());
                }
            }

            let Some(task) = self.pop_task(&engine_id) else {
                break None;
            };

            match self.current_handler() {
                Some(handler) => {
                    if let Err(e) = handler.handle(&task).await {
                        warn!(
                            engine = %engine_id,
                            scan_id = %task.scan_id,
                            error = %e,
                            "Task handler error"
                        );
                    }
                }
                None => {
                    warn!(engine = %engine_id, "No task handler installed; dropping task");
                }
            }
        };

        let mut inner = self.lock();
        inner.workers.remove(&engine_id);
        let has_work = inner
            .queues
            .get(&engine_id)
            .map(|q| !q.is_empty())
            .unwrap_or(false);
        if !has_work || inner.stopped {
            return;
        }

        match paused_reason {
            Some(reason) => {
                let timer_live = inner
                    .retry_timers
                    .get(&engine_id)
                    .map(|handle| !handle.is_finished())
                    .unwrap_or(false);
                if !timer_live {
                    info!(
                        engine = %engine_id,
                        reason = %reason,
                        retry_in_secs = RETRY_DELAY_SECS,
                        "Worker paused; retry scheduled"
                    );
                    let queue = self.clone();
                    let id = engine_id.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS)).await;
                        queue.lock().retry_timers.remove(&id);
                        queue.ensure_processing();
                    });
                    inner.retry_timers.insert(engine_id, handle);
                }
            }
            None => {
                // Tasks slipped in between the final pop and this
                // bookkeeping; hand the queue straight to a fresh worker
                let queue = self.clone();
                let id = engine_id.clone();
                let handle = tokio::spawn(async move { queue.run_worker(id).await });
                inner.workers.insert(engine_id, handle);
            }
        }
    }
}
