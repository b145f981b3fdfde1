//! 弹性模块：按供应商隔离故障的熔断器与共享注册表。
//!
//! # Failure Isolation Module
//!
//! This module protects downstream AI providers from repeated-failure
//! cascades. Each provider gets one [`CircuitBreaker`] shared across all
//! call sites through a [`CircuitBreakerRegistry`], so a flaky provider
//! fast-fails everywhere at once while healthy providers keep streaming.
//!
//! ## Circuit Breaker
//!
//! The breaker is a three-state machine:
//! - **Closed**: normal operation, requests pass through
//! - **Open**: failures inside the monitoring window reached the threshold,
//!   requests fail fast with [`crate::Error::BreakerOpen`]
//! - **Half-Open**: the recovery timeout elapsed; a few probe requests
//!   decide whether to close again or re-open
//!
//! ```rust
//! use fanout_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_recovery_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new("ai-provider-openai", config);
//!
//! if breaker.allow().is_ok() {
//!     // Make the provider call...
//!     breaker.record_success();
//! }
//! ```
//!
//! ## Registry
//!
//! The registry is an explicitly constructed component: build one at your
//! composition root and pass it to the orchestrator. Repeated lookups for
//! the same name share one breaker instance (first registration wins).

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{
    BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics,
};
pub use registry::CircuitBreakerRegistry;
