//! # fanout-core
//!
//! 多供应商 AI 并发编排核心：连接池调度、熔断隔离与流式事件合并。
//!
//! Client-side orchestration core for conversing with multiple AI providers
//! simultaneously. Each chat turn fans out into independent streaming
//! "possibilities" (one per model/temperature/instruction permutation) whose
//! token streams are merged back into a single ordered event sequence.
//!
//! ## Overview
//!
//! This crate deliberately contains no HTTP transport or provider SDK. The
//! provider call is an opaque collaborator behind the [`provider::Provider`]
//! trait; everything here is scheduling, failure isolation, and event
//! multiplexing:
//!
//! - **Bounded fan-out**: [`pool::ConnectionPool`] admits at most a fixed
//!   number of concurrent branches, ordered by a three-tier priority.
//! - **Failure isolation**: one [`resilience::CircuitBreaker`] per provider,
//!   shared across call sites through a [`resilience::CircuitBreakerRegistry`],
//!   fast-fails a tripped provider without blocking its siblings.
//! - **Event multiplexing**: [`orchestrator::Orchestrator`] turns raw
//!   per-token provider events into a unified [`StreamEvent`] sequence.
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Core type definitions (messages, permutations, events) |
//! | [`resilience`] | Circuit breaker and breaker registry |
//! | [`pool`] | Bounded-concurrency priority task scheduler |
//! | [`provider`] | Provider call boundary and model catalog |
//! | [`orchestrator`] | Possibility fan-out/fan-in coordinator |
//! | [`sse`] | Server-sent-event framing for the merged stream |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fanout_core::{Message, OrchestratorBuilder, PermutationSettings};
//! use fanout_core::orchestrator::generate_permutations;
//! use futures::StreamExt;
//!
//! # async fn run(providers: Arc<fanout_core::provider::ProviderRegistry>) {
//! let orchestrator = OrchestratorBuilder::new(providers).build();
//!
//! let settings = PermutationSettings::default();
//! let permutations = generate_permutations(&settings);
//! let messages = vec![Message::user("Hello, how are you?")];
//!
//! let mut events = orchestrator.stream_possibilities(messages, permutations);
//! while let Some(event) = events.next().await {
//!     // Feed a UI reducer or an SSE encoder...
//! }
//! # }
//! ```

pub mod error;
pub mod orchestrator;
pub mod pool;
pub mod provider;
pub mod resilience;
pub mod sse;
pub mod types;

// Re-export main types for convenience
pub use error::{Error, ErrorContext};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, OrchestratorSignals, PermutationSettings, PossibilityResult,
};
pub use pool::{ConnectionPool, PoolConfig, PoolMetrics, Priority, QueuedTask, TaskHandle};
pub use resilience::{
    BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics,
    CircuitBreakerRegistry,
};
pub use types::{
    events::StreamEvent,
    message::{Message, MessageRole},
    permutation::{Permutation, SystemInstruction},
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// The merged possibility event sequence. Per-branch failures travel inside
/// the stream as [`StreamEvent::Error`] items, never as stream termination.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'static>>;
