//! Pool metrics and the execution-time sample window.

use serde::Serialize;

/// Derived, read-only snapshot of pool state. Recomputed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct PoolMetrics {
    pub active_connections: usize,
    pub queued_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Rolling average over the last `sample_window` task durations, in ms.
    pub average_execution_time_ms: f64,
}

/// Fixed-capacity ring buffer of execution durations (ms).
///
/// O(1) insertion with no reallocation once full; the average covers the
/// most recent `capacity` samples.
#[derive(Debug)]
pub(crate) struct ExecutionSamples {
    buf: Vec<u64>,
    capacity: usize,
    next: usize,
}

impl ExecutionSamples {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    pub(crate) fn push(&mut self, duration_ms: u64) {
        if self.buf.len() < self.capacity {
            self.buf.push(duration_ms);
        } else {
            self.buf[self.next] = duration_ms;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub(crate) fn average(&self) -> f64 {
        if self.buf.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.buf.iter().sum();
        sum as f64 / self.buf.len() as f64
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_average_is_zero() {
        let samples = ExecutionSamples::new(100);
        assert_eq!(samples.average(), 0.0);
    }

    #[test]
    fn test_partial_fill_average() {
        let mut samples = ExecutionSamples::new(100);
        samples.push(10);
        samples.push(20);
        samples.push(30);
        assert_eq!(samples.len(), 3);
        assert!((samples.average() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_wraparound_keeps_last_capacity_samples() {
        let mut samples = ExecutionSamples::new(3);
        for v in [1, 2, 3, 100, 200, 300] {
            samples.push(v);
        }
        assert_eq!(samples.len(), 3);
        assert!((samples.average() - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut samples = ExecutionSamples::new(0);
        samples.push(5);
        samples.push(7);
        assert_eq!(samples.len(), 1);
        assert!((samples.average() - 7.0).abs() < f64::EPSILON);
    }
}
