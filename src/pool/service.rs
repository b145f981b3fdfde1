use super::metrics::{ExecutionSamples, PoolMetrics};
use crate::{Error, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Admission priority. Exactly three tiers; within a tier insertion order
/// is preserved (FIFO, no starvation reordering across tier boundaries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

type TaskFuture = BoxFuture<'static, Result<()>>;
type TaskFn = Box<dyn FnOnce() -> TaskFuture + Send + 'static>;
type ErrorHook = Box<dyn FnOnce(&Error) + Send + 'static>;

/// A unit of work owned exclusively by the pool once enqueued.
///
/// The id must be unique among currently queued/active tasks; it is the key
/// for targeted abort.
pub struct QueuedTask {
    pub id: String,
    pub priority: Priority,
    execute: TaskFn,
    on_error: Option<ErrorHook>,
}

impl QueuedTask {
    pub fn new<F, Fut>(id: impl Into<String>, priority: Priority, execute: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            priority,
            execute: Box::new(move || Box::pin(execute())),
            on_error: None,
        }
    }

    /// Invoked with the error when the task's execution fails. Not invoked
    /// for aborts; those are delivered only through the [`TaskHandle`].
    pub fn with_error_hook(mut self, hook: impl FnOnce(&Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedTask")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Concurrency ceiling. Sized for typical per-host connection limits.
    pub max_connections: usize,
    /// Number of recent execution durations kept for the rolling average.
    pub sample_window: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 6,
            sample_window: 100,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn with_sample_window(mut self, window: usize) -> Self {
        self.sample_window = window.max(1);
        self
    }
}

struct QueueEntry {
    task: QueuedTask,
    done: oneshot::Sender<Result<()>>,
}

/// Three-deque queue: pop order high -> medium -> low gives "before all
/// lower-priority, after all equal-or-higher" insertion for free.
#[derive(Default)]
struct TaskQueue {
    high: VecDeque<QueueEntry>,
    medium: VecDeque<QueueEntry>,
    low: VecDeque<QueueEntry>,
}

impl TaskQueue {
    fn push(&mut self, entry: QueueEntry) {
        match entry.task.priority {
            Priority::High => self.high.push_back(entry),
            Priority::Medium => self.medium.push_back(entry),
            Priority::Low => self.low.push_back(entry),
        }
    }

    fn pop(&mut self) -> Option<QueueEntry> {
        self.high
            .pop_front()
            .or_else(|| self.medium.pop_front())
            .or_else(|| self.low.pop_front())
    }

    fn remove(&mut self, id: &str) -> Option<QueueEntry> {
        for deque in [&mut self.high, &mut self.medium, &mut self.low] {
            if let Some(pos) = deque.iter().position(|e| e.task.id == id) {
                return deque.remove(pos);
            }
        }
        None
    }

    fn drain(&mut self) -> Vec<QueueEntry> {
        self.high
            .drain(..)
            .chain(self.medium.drain(..))
            .chain(self.low.drain(..))
            .collect()
    }

    fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct PoolState {
    queue: TaskQueue,
    active: usize,
    completed: u64,
    failed: u64,
    samples: ExecutionSamples,
}

struct Inner {
    cfg: PoolConfig,
    state: Mutex<PoolState>,
}

/// Bounded-concurrency priority task scheduler.
///
/// Cheap to clone; all clones share one queue and one set of counters.
/// Tasks run on `tokio::spawn`, so a tokio runtime must be current when
/// enqueuing.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Inner>,
}

impl ConnectionPool {
    pub fn new(cfg: PoolConfig) -> Self {
        let samples = ExecutionSamples::new(cfg.sample_window);
        Self {
            inner: Arc::new(Inner {
                cfg,
                state: Mutex::new(PoolState {
                    queue: TaskQueue::default(),
                    active: 0,
                    completed: 0,
                    failed: 0,
                    samples,
                }),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.cfg
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a task and immediately attempt admission.
    ///
    /// The returned handle resolves when the task's execution finishes, or
    /// rejects with the task's error (or [`Error::TaskAborted`] if the task
    /// is cancelled before it starts).
    pub fn enqueue(&self, task: QueuedTask) -> TaskHandle {
        let id = task.id.clone();
        let (tx, rx) = oneshot::channel();
        {
            let mut st = self.lock();
            st.queue.push(QueueEntry { task, done: tx });
        }
        debug!(task_id = id.as_str(), "task enqueued");
        self.pump();
        TaskHandle { id, rx }
    }

    /// Admission loop: start queued tasks while slots are free. Runs again
    /// after every completion so a freed slot is immediately backfilled.
    fn pump(&self) {
        loop {
            let entry = {
                let mut st = self.lock();
                if st.active >= self.inner.cfg.max_connections || st.queue.is_empty() {
                    return;
                }
                st.active += 1;
                // Non-empty checked above.
                match st.queue.pop() {
                    Some(e) => e,
                    None => {
                        st.active -= 1;
                        return;
                    }
                }
            };

            let pool = self.clone();
            tokio::spawn(async move {
                let QueueEntry { task, done } = entry;
                let task_id = task.id;
                let on_error = task.on_error;
                debug!(task_id = task_id.as_str(), "task started");

                let start = Instant::now();
                let result = (task.execute)().await;
                let elapsed_ms = start.elapsed().as_millis() as u64;

                {
                    let mut st = pool.lock();
                    st.active -= 1;
                    st.samples.push(elapsed_ms);
                    match &result {
                        Ok(()) => st.completed += 1,
                        Err(_) => st.failed += 1,
                    }
                }

                if let Err(ref err) = result {
                    warn!(
                        task_id = task_id.as_str(),
                        error = %err,
                        duration_ms = elapsed_ms,
                        "task failed"
                    );
                    if let Some(hook) = on_error {
                        hook(err);
                    }
                } else {
                    debug!(
                        task_id = task_id.as_str(),
                        duration_ms = elapsed_ms,
                        "task completed"
                    );
                }

                // Receiver may have been dropped; completion still counts.
                let _ = done.send(result);

                pool.pump();
            });
        }
    }

    /// Abort a task that is still queued. Returns whether one was found.
    /// Tasks already executing are not preempted.
    pub fn abort_task(&self, id: &str) -> bool {
        let entry = {
            let mut st = self.lock();
            st.queue.remove(id)
        };
        match entry {
            Some(entry) => {
                debug!(task_id = id, "queued task aborted");
                let _ = entry.done.send(Err(Error::TaskAborted {
                    task_id: id.to_string(),
                }));
                true
            }
            None => false,
        }
    }

    /// Abort every queued (not-yet-started) task; active tasks keep running.
    /// Returns the number of tasks aborted.
    pub fn abort_all(&self) -> usize {
        let entries = {
            let mut st = self.lock();
            st.queue.drain()
        };
        let count = entries.len();
        for entry in entries {
            let task_id = entry.task.id;
            let _ = entry.done.send(Err(Error::TaskAborted {
                task_id: task_id.clone(),
            }));
        }
        if count > 0 {
            debug!(aborted = count, "aborted all queued tasks");
        }
        count
    }

    pub fn metrics(&self) -> PoolMetrics {
        let st = self.lock();
        PoolMetrics {
            active_connections: st.active,
            queued_tasks: st.queue.len(),
            completed_tasks: st.completed,
            failed_tasks: st.failed,
            average_execution_time_ms: st.samples.average(),
        }
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

/// Future resolving with the outcome of an enqueued task.
pub struct TaskHandle {
    id: String,
    rx: oneshot::Receiver<Result<()>>,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for TaskHandle {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|recv| match recv {
            Ok(result) => result,
            // Sender dropped without a result; only possible if the pool
            // itself was torn down mid-task.
            Err(_) => Err(Error::runtime("pool dropped task result channel")),
        })
    }
}
