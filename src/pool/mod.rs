//! 连接池模块：优先级排队、并发上限与可取消的任务调度。
//!
//! # Bounded-Concurrency Task Scheduler
//!
//! This module bounds the number of concurrently in-flight asynchronous
//! tasks (outbound provider calls) to a fixed ceiling while ordering
//! admission by a three-tier priority and supporting cancellation of tasks
//! that have not started yet.
//!
//! The default ceiling (6) is sized to respect typical per-host browser/API
//! connection limits; once a task's network call has started it runs to
//! completion, so only queued tasks can be aborted.
//!
//! ```rust,no_run
//! use fanout_core::pool::{ConnectionPool, PoolConfig, Priority, QueuedTask};
//!
//! # async fn run() -> fanout_core::Result<()> {
//! let pool = ConnectionPool::new(PoolConfig::default());
//!
//! let handle = pool.enqueue(QueuedTask::new("perm-1", Priority::High, || async {
//!     // issue the provider call...
//!     Ok(())
//! }));
//! handle.await?;
//! # Ok(())
//! # }
//! ```

pub mod metrics;
pub mod service;

pub use metrics::PoolMetrics;
pub use service::{ConnectionPool, PoolConfig, Priority, QueuedTask, TaskHandle};
