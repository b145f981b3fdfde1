use crate::{Error, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::info;

/// Breaker state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures inside `monitoring_window` that trip the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before probing recovery.
    pub recovery_timeout: Duration,
    /// Sliding window over which failures are counted.
    pub monitoring_window: Duration,
    /// Consecutive half-open successes required to close again.
    pub success_threshold: u32,
    /// Advisory retry budget for callers; the breaker performs no retries.
    pub max_retries: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
            success_threshold: 3,
            max_retries: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Stricter defaults suited to external LLM provider APIs.
    pub fn for_provider() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            monitoring_window: Duration::from_secs(300),
            success_threshold: 2,
            max_retries: 3,
        }
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the recovery timeout
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Set the sliding monitoring window
    pub fn with_monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }

    /// Set the half-open success threshold
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the advisory caller retry budget
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Read-only metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerMetrics {
    pub state: BreakerState,
    pub failure_count: u64,
    pub success_count: u64,
    pub total_attempts: u64,
    pub state_changes: u64,
    /// Failures currently inside the monitoring window.
    pub window_failures: usize,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
    pub last_failure_ms_ago: Option<u64>,
    pub last_success_ms_ago: Option<u64>,
}

#[derive(Debug)]
struct State {
    state: BreakerState,
    failure_count: u64,
    success_count: u64,
    /// Successes since entering half-open; the close decision counts these.
    half_open_successes: u32,
    total_attempts: u64,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    state_changes: u64,
    failure_window: VecDeque<Instant>,
}

impl State {
    fn initial() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_successes: 0,
            total_attempts: 0,
            last_failure: None,
            last_success: None,
            state_changes: 0,
            failure_window: VecDeque::new(),
        }
    }
}

/// Per-target failure-isolation state machine.
///
/// - Counts failures in a sliding time window, not over the lifetime
/// - Opens for `recovery_timeout` after the threshold is crossed
/// - Probes recovery through a half-open state
/// - Performs no retries of its own (`max_retries` is caller guidance)
pub struct CircuitBreaker {
    name: String,
    cfg: CircuitBreakerConfig,
    state: std::sync::Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, cfg: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            cfg,
            state: std::sync::Mutex::new(State::initial()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a panic mid-update; the counters are
        // still usable for a fail-soft component.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, st: &mut State, to: BreakerState) {
        if st.state == to {
            return;
        }
        info!(
            breaker = self.name.as_str(),
            from = %st.state,
            to = %to,
            "circuit breaker state change"
        );
        st.state = to;
        st.state_changes += 1;
        if to == BreakerState::HalfOpen {
            st.half_open_successes = 0;
        }
        if to == BreakerState::Closed {
            st.failure_count = 0;
            st.success_count = 0;
            st.half_open_successes = 0;
            st.failure_window.clear();
        }
    }

    /// Lazy open -> half-open check; runs on every state read.
    fn check_recovery(&self, st: &mut State) {
        if st.state != BreakerState::Open {
            return;
        }
        let elapsed = st.last_failure.map(|t| t.elapsed());
        if elapsed.map(|e| e >= self.cfg.recovery_timeout).unwrap_or(true) {
            self.transition(st, BreakerState::HalfOpen);
        }
    }

    fn prune_window(&self, st: &mut State) {
        // checked_sub: the window may exceed the process uptime.
        let Some(cutoff) = Instant::now().checked_sub(self.cfg.monitoring_window) else {
            return;
        };
        while st.failure_window.front().map(|t| *t < cutoff).unwrap_or(false) {
            st.failure_window.pop_front();
        }
    }

    fn record_success_locked(&self, st: &mut State) {
        st.success_count += 1;
        st.last_success = Some(Instant::now());
        if st.state == BreakerState::HalfOpen {
            st.half_open_successes += 1;
            if st.half_open_successes >= self.cfg.success_threshold {
                self.transition(st, BreakerState::Closed);
            }
        }
    }

    fn record_failure_locked(&self, st: &mut State) {
        let now = Instant::now();
        st.failure_count += 1;
        st.last_failure = Some(now);
        st.failure_window.push_back(now);
        self.prune_window(st);

        match st.state {
            BreakerState::Closed => {
                if st.failure_window.len() >= self.cfg.failure_threshold as usize {
                    self.transition(st, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                self.transition(st, BreakerState::Open);
            }
            BreakerState::Open => {}
        }
    }

    fn open_error(&self, st: &State) -> Error {
        let retry_in_ms = st.last_failure.map(|t| {
            let elapsed = t.elapsed();
            self.cfg
                .recovery_timeout
                .saturating_sub(elapsed)
                .as_millis() as u64
        });
        Error::BreakerOpen {
            name: self.name.clone(),
            retry_in_ms,
        }
    }

    /// Fast-fail check for callers that cannot wrap the call in a future
    /// factory (e.g. long-lived streams). Pair with [`Self::record_success`]
    /// / [`Self::record_failure`] once the outcome is known.
    pub fn allow(&self) -> Result<()> {
        let mut st = self.lock();
        self.check_recovery(&mut st);
        if st.state == BreakerState::Open {
            return Err(self.open_error(&st));
        }
        Ok(())
    }

    /// Run `operation` through the breaker.
    ///
    /// When open (after the lazy recovery check) this rejects with
    /// [`Error::BreakerOpen`] without invoking the operation. Otherwise the
    /// outcome is recorded and the original error passes through unchanged.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        {
            let mut st = self.lock();
            self.check_recovery(&mut st);
            if st.state == BreakerState::Open {
                return Err(self.open_error(&st));
            }
            st.total_attempts += 1;
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    /// Manual success bookkeeping, equivalent to what `execute` records.
    pub fn record_success(&self) {
        let mut st = self.lock();
        self.record_success_locked(&mut st);
    }

    /// Manual failure bookkeeping, equivalent to what `execute` records.
    pub fn record_failure(&self) {
        let mut st = self.lock();
        self.record_failure_locked(&mut st);
    }

    /// Current state, after the lazy open -> half-open check.
    pub fn state(&self) -> BreakerState {
        let mut st = self.lock();
        self.check_recovery(&mut st);
        st.state
    }

    /// Closed, or half-open with at least one probe success recorded.
    pub fn is_healthy(&self) -> bool {
        let mut st = self.lock();
        self.check_recovery(&mut st);
        match st.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => st.half_open_successes >= 1,
            BreakerState::Open => false,
        }
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let mut st = self.lock();
        self.check_recovery(&mut st);
        self.prune_window(&mut st);

        let open_remaining_ms = if st.state == BreakerState::Open {
            st.last_failure.map(|t| {
                self.cfg
                    .recovery_timeout
                    .saturating_sub(t.elapsed())
                    .as_millis() as u64
            })
        } else {
            None
        };

        CircuitBreakerMetrics {
            state: st.state,
            failure_count: st.failure_count,
            success_count: st.success_count,
            total_attempts: st.total_attempts,
            state_changes: st.state_changes,
            window_failures: st.failure_window.len(),
            open_remaining_ms,
            last_failure_ms_ago: st.last_failure.map(|t| t.elapsed().as_millis() as u64),
            last_success_ms_ago: st.last_success.map(|t| t.elapsed().as_millis() as u64),
        }
    }

    /// Administrative override. Forcing `Closed` also resets counters;
    /// forcing `Open` holds for a full `recovery_timeout` from now, even if
    /// the last recorded failure is older than that.
    pub fn force_state(&self, state: BreakerState) {
        let mut st = self.lock();
        self.transition(&mut st, state);
        if state == BreakerState::Open {
            st.last_failure = Some(Instant::now());
        }
    }

    /// Full reset to the initial closed state with zeroed counters.
    pub fn reset(&self) {
        let mut st = self.lock();
        *st = State::initial();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(3)
            .with_recovery_timeout(Duration::from_millis(50))
            .with_monitoring_window(Duration::from_millis(500))
            .with_success_threshold(2)
    }

    #[test]
    fn test_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(30));
        assert_eq!(config.monitoring_window, Duration::from_secs(60));
        assert_eq!(config.success_threshold, 3);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_provider_preset() {
        let config = CircuitBreakerConfig::for_provider();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.monitoring_window, Duration::from_secs(300));
        assert_eq!(config.success_threshold, 2);
    }

    #[test]
    fn test_initial_state() {
        let cb = CircuitBreaker::new("test", fast_config());
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.is_healthy());
        assert!(cb.allow().is_ok());

        let m = cb.metrics();
        assert_eq!(m.failure_count, 0);
        assert_eq!(m.window_failures, 0);
        assert!(m.open_remaining_ms.is_none());
    }

    #[test]
    fn test_opens_at_threshold_not_before() {
        let cb = CircuitBreaker::new("test", fast_config());

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.is_healthy());

        let err = cb.allow().unwrap_err();
        assert!(err.is_breaker_open());
    }

    #[tokio::test]
    async fn test_open_rejects_without_invoking_operation() {
        let cb = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let result: Result<()> = cb
            .execute(move || async move {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_breaker_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // Fast-failed calls are not attempts.
        assert_eq!(cb.metrics().total_attempts, 0);
    }

    #[tokio::test]
    async fn test_half_open_recovery_cycle() {
        let cb = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(!cb.is_healthy());

        // Two consecutive successes (success_threshold) close the breaker.
        let r: Result<u8> = cb.execute(|| async { Ok(1) }).await;
        assert_eq!(r.unwrap(), 1);
        assert!(cb.is_healthy());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        let r: Result<u8> = cb.execute(|| async { Ok(2) }).await;
        assert_eq!(r.unwrap(), 2);
        assert_eq!(cb.state(), BreakerState::Closed);

        let m = cb.metrics();
        assert_eq!(m.failure_count, 0);
        assert_eq!(m.success_count, 0);
        assert_eq!(m.window_failures, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_window_excludes_old_failures() {
        let cb = CircuitBreaker::new(
            "test",
            fast_config().with_monitoring_window(Duration::from_millis(40)),
        );

        cb.record_failure();
        cb.record_failure();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // The two old failures fell out of the window; this one is the
        // only failure counted.
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.metrics().window_failures, 1);
        // Lifetime counter is unaffected by pruning.
        assert_eq!(cb.metrics().failure_count, 3);
    }

    #[tokio::test]
    async fn test_execute_passes_original_error_through() {
        let cb = CircuitBreaker::new("test", fast_config());
        let result: Result<()> = cb
            .execute(|| async { Err(Error::provider("openai", "rate limited")) })
            .await;
        match result.unwrap_err() {
            Error::Provider { provider, message, .. } => {
                assert_eq!(provider, "openai");
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cb.metrics().window_failures, 1);
        assert_eq!(cb.metrics().total_attempts, 1);
    }

    #[test]
    fn test_force_state_and_reset() {
        let cb = CircuitBreaker::new("test", fast_config());
        cb.record_failure();

        cb.force_state(BreakerState::Open);
        assert!(cb.allow().is_err());

        cb.force_state(BreakerState::Closed);
        assert!(cb.allow().is_ok());
        assert_eq!(cb.metrics().failure_count, 0);

        cb.record_failure();
        cb.reset();
        let m = cb.metrics();
        assert_eq!(m.state, BreakerState::Closed);
        assert_eq!(m.failure_count, 0);
        assert_eq!(m.state_changes, 0);
    }

    #[tokio::test]
    async fn test_force_open_holds_despite_stale_failure() {
        // recovery_timeout 50ms; a failure recorded 60ms before the forced
        // open must not let the lazy recovery check flip it straight to
        // half-open.
        let cb = CircuitBreaker::new("test", fast_config());
        cb.record_failure();
        tokio::time::sleep(Duration::from_millis(60)).await;

        cb.force_state(BreakerState::Open);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.allow().is_err());

        // The full timeout still applies from the moment of forcing.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_metrics_are_idempotent() {
        let cb = CircuitBreaker::new("test", fast_config());
        cb.record_failure();
        let a = cb.metrics();
        let b = cb.metrics();
        assert_eq!(a.failure_count, b.failure_count);
        assert_eq!(a.window_failures, b.window_failures);
        assert_eq!(a.state, b.state);
        assert_eq!(cb.state(), cb.state());
    }

    #[test]
    fn test_thread_safe_recording() {
        use std::thread;

        let cb = Arc::new(CircuitBreaker::new(
            "test",
            fast_config().with_failure_threshold(1000),
        ));
        let mut handles = vec![];
        for _ in 0..10 {
            let cb = Arc::clone(&cb);
            handles.push(thread::spawn(move || {
                for _ in 0..5 {
                    cb.record_failure();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cb.metrics().failure_count, 50);
    }
}
