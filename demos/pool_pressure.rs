//! Connection Pool Pressure Example
//!
//! This example exercises the bounded task pool directly:
//! - A hard ceiling on concurrently running tasks
//! - Three-tier priority scheduling (high before medium before low)
//! - Aborting a task that is still queued
//! - Pool metrics with a rolling execution-time average
//!
//! Usage:
//!   cargo run --example pool_pressure

use fanout_core::pool::{ConnectionPool, PoolConfig, Priority, QueuedTask};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanout_core=debug".into()),
        )
        .init();

    println!("=== Connection Pool Pressure Demo ===\n");

    let pool = ConnectionPool::new(PoolConfig::new().with_max_connections(2));
    println!("Pool ceiling: 2 concurrent tasks\n");

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    // Queue a batch of mixed-priority tasks. With a ceiling of 2 the first
    // two start immediately; the rest wait in priority order.
    let mut handles = Vec::new();
    let specs = [
        ("low-1", Priority::Low),
        ("low-2", Priority::Low),
        ("med-1", Priority::Medium),
        ("high-1", Priority::High),
        ("med-2", Priority::Medium),
        ("high-2", Priority::High),
    ];
    for (name, priority) in specs {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        let task = QueuedTask::new(name, priority, move || async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            println!("running {} ({} in flight)", name, now);
            tokio::time::sleep(Duration::from_millis(80)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
        handles.push((name, pool.enqueue(task)));
    }

    // One more task we immediately change our mind about.
    let doomed = QueuedTask::new("doomed", Priority::Low, || async {
        println!("this should never print");
        Ok(())
    });
    let doomed_handle = pool.enqueue(doomed);
    let aborted = pool.abort_task("doomed");
    println!("aborted queued task 'doomed': {}", aborted);

    println!("\nmetrics while under load: {:?}\n", pool.metrics());

    for (name, handle) in handles {
        match handle.await {
            Ok(()) => println!("finished {}", name),
            Err(err) => println!("failed {}: {}", name, err),
        }
    }
    match doomed_handle.await {
        Err(err) if err.is_aborted() => println!("doomed resolved as aborted: {}", err),
        other => println!("unexpected outcome for doomed: {:?}", other),
    }

    let metrics = pool.metrics();
    println!("\nfinal metrics:");
    println!("  completed:  {}", metrics.completed_tasks);
    println!("  failed:     {}", metrics.failed_tasks);
    println!("  queued:     {}", metrics.queued_tasks);
    println!("  avg run ms: {:.1}", metrics.average_execution_time_ms);
    println!("  peak concurrency observed: {}", peak.load(Ordering::SeqCst));
}
