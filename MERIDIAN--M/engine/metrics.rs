//! Rolled-up counters maintained by each engine.

use serde::{Deserialize, Serialize};

/// Cumulative processing counters for one engine.
///
/// `processed` counts attempts, so a job that fails twice and then succeeds
/// contributes three to `processed` and one to `succeeded`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Handler attempts executed.
    pub processed: u64,
    /// Jobs that reached [`JobStatus::Succeeded`](crate::job::JobStatus::Succeeded).
    pub succeeded: u64,
    /// Jobs that exhausted their attempt budget.
    pub failed: u64,
    /// Total wall-clock milliseconds spent inside handlers.
    pub runtime_ms: u64,
}

impl EngineMetrics {
    /// Share of attempts that succeeded, as a percentage in `0.0..=100.0`.
    /// Returns `0.0` before anything has been processed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.processed as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_zero_before_first_attempt() {
        let metrics = EngineMetrics::default();
        assert!((metrics.success_rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn success_rate_stays_in_band() {
        let metrics = EngineMetrics {
            processed: 4,
            succeeded: 1,
            failed: 1,
            runtime_ms: 12,
        };
        let rate = metrics.success_rate();
        assert!((0.0..=100.0).contains(&rate));
        assert!((rate - 25.0).abs() < f64::EPSILON);
    }
}
