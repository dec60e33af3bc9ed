//! Job records processed by Meridian engines.
//!
//! A [`Job`] is a unit of work admitted to an engine queue. Jobs carry a
//! priority between 1 and 10, a bounded attempt budget, and an arbitrary
//! JSON payload interpreted by the engine's handler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifier assigned to a job at admission.
pub type JobId = Uuid;

/// Lowest priority accepted by a queue.
pub const PRIORITY_MIN: u8 = 1;
/// Highest priority accepted by a queue.
pub const PRIORITY_MAX: u8 = 10;

/// Clamps a requested priority into the accepted `1..=10` band.
#[must_use]
pub fn clamp_priority(priority: u8) -> u8 {
    priority.clamp(PRIORITY_MIN, PRIORITY_MAX)
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admitted and waiting in the queue.
    Queued,
    /// Currently being handled.
    Running,
    /// Handler returned a result.
    Succeeded,
    /// Attempt budget exhausted without success.
    Failed,
    /// Withdrawn before it was handled.
    Cancelled,
}

impl JobStatus {
    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the job has reached a state it will never leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// A unit of work owned by exactly one engine queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier assigned at admission.
    pub id: JobId,
    /// Handler dispatch key, e.g. `"commerce.price_review"`.
    pub job_type: String,
    /// Arbitrary JSON payload for the handler.
    pub payload: Value,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Priority in `1..=10`; higher runs first.
    pub priority: u8,
    /// Attempts consumed so far.
    pub attempts: u32,
    /// Attempts allowed before the job is marked failed.
    pub max_attempts: u32,
    /// Result produced by a successful handler run.
    pub result: Option<Value>,
    /// Message from the most recent failed attempt.
    pub error: Option<String>,
    /// When the job was admitted.
    pub created_at: DateTime<Utc>,
    /// When the most recent attempt began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Admission order within the queue; refreshed on re-queue so retried
    /// jobs sit behind peers of the same priority.
    #[serde(default)]
    pub(crate) seq: u64,
}

impl Job {
    /// Creates a queued job with a clamped priority. The queue assigns the
    /// admission sequence when the job is admitted.
    #[must_use]
    pub fn new(job_type: impl Into<String>, payload: Value, priority: u8, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Queued,
            priority: clamp_priority(priority),
            attempts: 0,
            max_attempts: max_attempts.max(1),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            seq: 0,
        }
    }

    /// Whether another attempt is still allowed after a failure.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Receipt returned when a job is admitted to a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    /// Identifier of the admitted job.
    pub id: JobId,
    /// Status at admission, always [`JobStatus::Queued`].
    pub status: JobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn priority_is_clamped_into_band() {
        let low = Job::new("noop", json!({}), 0, 3);
        let high = Job::new("noop", json!({}), 42, 3);
        assert_eq!(low.priority, PRIORITY_MIN);
        assert_eq!(high.priority, PRIORITY_MAX);
    }

    #[test]
    fn new_job_is_queued_with_zero_attempts() {
        let job = Job::new("commerce.price_review", json!({"sku": "TEE-01"}), 5, 3);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.retryable());
        assert!(!job.status.is_terminal());
    }

    #[test]
    fn max_attempts_never_drops_below_one() {
        let job = Job::new("noop", json!({}), 5, 0);
        assert_eq!(job.max_attempts, 1);
    }
}
