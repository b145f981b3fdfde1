//! 编排模块：将一次对话回合扇出为多个流式 "possibility" 分支。
//!
//! # Possibility Streaming Orchestrator
//!
//! Given a list of conversation messages and a list of generation
//! permutations, the orchestrator drives one provider call per permutation,
//! multiplexes their streaming token output into a single ordered event
//! sequence, and exposes it as a forward-only stream of
//! [`StreamEvent`](crate::StreamEvent)s terminated by `done`.
//!
//! Per branch the orchestrator resolves the model, announces
//! `possibility_start`, wraps the provider call with that provider's
//! circuit breaker, relays token deltas, scores a probability when
//! logprobs are available, and falls back to a non-streaming call with
//! synthesized token events when the streaming call fails outright. A
//! branch failure becomes an `error` event for that permutation only.
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`stream`] | Branch driving and event multiplexing |
//! | [`permutations`] | Settings -> permutation expansion |
//! | [`probability`] | Geometric-mean probability scoring |

pub mod permutations;
pub mod probability;
pub mod stream;

pub use permutations::{generate_permutations, PermutationSettings, SelectedModel};
pub use probability::geometric_mean_probability;

use crate::pool::{ConnectionPool, PoolMetrics, Priority};
use crate::provider::ProviderRegistry;
use crate::resilience::{CircuitBreakerMetrics, CircuitBreakerRegistry};
use crate::types::events::StreamEvent;
use crate::types::message::Message;
use crate::types::permutation::Permutation;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

type PriorityFn = Arc<dyn Fn(&Permutation) -> Priority + Send + Sync>;

const DEFAULT_FALLBACK_CHUNK_DELAY: Duration = Duration::from_millis(30);

/// Fan-out/fan-in streaming coordinator. Construct via [`OrchestratorBuilder`].
pub struct Orchestrator {
    pub(crate) providers: Arc<ProviderRegistry>,
    pub(crate) breakers: Arc<CircuitBreakerRegistry>,
    pub(crate) pool: Option<ConnectionPool>,
    pub(crate) system_prompt: Option<String>,
    pub(crate) fallback_chunk_delay: Duration,
    pub(crate) priority_fn: PriorityFn,
}

/// Builder for [`Orchestrator`]. All collaborators are injected explicitly;
/// there is no process-wide default instance.
pub struct OrchestratorBuilder {
    providers: Arc<ProviderRegistry>,
    breakers: Option<Arc<CircuitBreakerRegistry>>,
    pool: Option<ConnectionPool>,
    system_prompt: Option<String>,
    fallback_chunk_delay: Duration,
    priority_fn: PriorityFn,
}

impl OrchestratorBuilder {
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self {
            providers,
            breakers: None,
            pool: None,
            system_prompt: None,
            fallback_chunk_delay: DEFAULT_FALLBACK_CHUNK_DELAY,
            priority_fn: Arc::new(|_| Priority::Medium),
        }
    }

    /// Share a breaker registry with other components. Defaults to a fresh
    /// registry with per-provider presets.
    pub fn with_breakers(mut self, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    /// Bound branch concurrency with a connection pool. Required for
    /// interactive fan-out; without it branches run unbounded.
    pub fn with_pool(mut self, pool: ConnectionPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Global system prompt prepended (together with the permutation's
    /// instruction) to every branch's message list.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Artificial delay between synthesized token chunks on the
    /// non-streaming fallback path.
    pub fn with_fallback_chunk_delay(mut self, delay: Duration) -> Self {
        self.fallback_chunk_delay = delay;
        self
    }

    /// Fixed priority for every branch.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority_fn = Arc::new(move |_| priority);
        self
    }

    /// Per-permutation priority classifier (e.g. favored models first).
    pub fn with_priority_fn(
        mut self,
        priority_fn: impl Fn(&Permutation) -> Priority + Send + Sync + 'static,
    ) -> Self {
        self.priority_fn = Arc::new(priority_fn);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            providers: self.providers,
            breakers: self
                .breakers
                .unwrap_or_else(|| Arc::new(CircuitBreakerRegistry::for_providers())),
            pool: self.pool,
            system_prompt: self.system_prompt,
            fallback_chunk_delay: self.fallback_chunk_delay,
            priority_fn: self.priority_fn,
        }
    }
}

/// One finished possibility, aggregated from the event stream.
#[derive(Debug, Clone, Serialize)]
pub struct PossibilityResult {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub temperature: f64,
    pub content: String,
    pub probability: Option<f64>,
}

/// Facts-only runtime snapshot for application-layer decisions.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorSignals {
    pub pool: Option<PoolMetrics>,
    pub breakers: HashMap<String, CircuitBreakerMetrics>,
}

impl Orchestrator {
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn pool(&self) -> Option<&ConnectionPool> {
        self.pool.as_ref()
    }

    /// Snapshot current runtime signals (facts only, no policy).
    pub fn signals(&self) -> OrchestratorSignals {
        OrchestratorSignals {
            pool: self.pool.as_ref().map(|p| p.metrics()),
            breakers: self.breakers.all_metrics(),
        }
    }

    /// Non-streaming convenience: run the fan-out to completion and return
    /// the finished possibilities, dropping any whose accumulated content
    /// is empty or whitespace-only. Failed branches are simply absent.
    pub async fn generate_possibilities(
        &self,
        messages: Vec<Message>,
        permutations: Vec<Permutation>,
    ) -> Vec<PossibilityResult> {
        let mut events = self.stream_possibilities(messages, permutations);

        let mut order: Vec<String> = Vec::new();
        let mut pending: HashMap<String, PossibilityResult> = HashMap::new();
        let mut finished: HashMap<String, PossibilityResult> = HashMap::new();

        while let Some(event) = events.next().await {
            match event {
                StreamEvent::PossibilityStart {
                    id,
                    provider,
                    model,
                    temperature,
                    ..
                } => {
                    order.push(id.clone());
                    pending.insert(
                        id.clone(),
                        PossibilityResult {
                            id,
                            provider,
                            model,
                            temperature,
                            content: String::new(),
                            probability: None,
                        },
                    );
                }
                StreamEvent::PossibilityComplete {
                    id,
                    content,
                    probability,
                } => {
                    if let Some(mut result) = pending.remove(&id) {
                        result.content = content;
                        result.probability = probability;
                        finished.insert(id, result);
                    }
                }
                StreamEvent::Error { id, .. } => {
                    pending.remove(&id);
                }
                StreamEvent::Done => break,
                // Token/probability deltas are folded at completion; the
                // complete event carries the authoritative content.
                _ => {}
            }
        }

        order
            .into_iter()
            .filter_map(|id| finished.remove(&id))
            .filter(|r| !r.content.trim().is_empty())
            .collect()
    }
}
