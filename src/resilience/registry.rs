use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Keyed factory/cache of shared [`CircuitBreaker`] instances.
///
/// Repeated lookups for the same name (e.g. `ai-provider-openai`) return the
/// same breaker, so failure state is shared across all call sites. Build one
/// registry at your composition root and inject it; each test constructs its
/// own instance instead of relying on a process-wide global.
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Registry with the standard breaker defaults.
    pub fn new() -> Self {
        Self::with_defaults(CircuitBreakerConfig::default())
    }

    /// Registry pre-configured for external LLM provider targets
    /// (stricter threshold, longer cooldown and window).
    pub fn for_providers() -> Self {
        Self::with_defaults(CircuitBreakerConfig::for_provider())
    }

    pub fn with_defaults(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.breakers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get or lazily create the breaker for `name` with the registry defaults.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breaker_with(name, self.defaults.clone())
    }

    /// Get or lazily create the breaker for `name` with an explicit config.
    ///
    /// The first registration wins: a differing `config` on later calls for
    /// the same name is ignored.
    pub fn breaker_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let mut map = self.lock();
        if let Some(existing) = map.get(name) {
            return Arc::clone(existing);
        }
        debug!(breaker = name, "registering circuit breaker");
        let breaker = Arc::new(CircuitBreaker::new(name, config));
        map.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Metrics snapshots keyed by breaker name.
    pub fn all_metrics(&self) -> HashMap<String, CircuitBreakerMetrics> {
        self.lock()
            .iter()
            .map(|(name, cb)| (name.clone(), cb.metrics()))
            .collect()
    }

    /// Configs keyed by breaker name.
    pub fn all_configs(&self) -> HashMap<String, CircuitBreakerConfig> {
        self.lock()
            .iter()
            .map(|(name, cb)| (name.clone(), cb.config().clone()))
            .collect()
    }

    /// Names of breakers whose `is_healthy()` is currently false.
    pub fn unhealthy(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, cb)| !cb.is_healthy())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn has_unhealthy(&self) -> bool {
        self.lock().values().any(|cb| !cb.is_healthy())
    }

    /// Reset every cached breaker in place (same instances, cleared state).
    pub fn reset_all(&self) {
        for cb in self.lock().values() {
            cb.reset();
        }
    }

    /// Evict a breaker; returns whether one existed.
    pub fn remove(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
