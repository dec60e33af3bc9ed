//! Engine control loop: admission, prioritized draining, bounded retry.
//!
//! An [`Engine`] owns a [`JobQueue`](crate::queue::JobQueue) and a handler.
//! `run()` drains the queue to empty, including work admitted mid-drain:
//! retries re-enter the queue, and a successful result may carry a
//! `followups` array whose entries are admitted and handled in the same
//! run. A drain budget bounds that recursion; exhausting it marks the
//! engine failed instead of spinning forever.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::LogLevel;
use thiserror::Error;
use uuid::Uuid;

use crate::job::{Job, JobId, JobStatus, JobTicket};
use crate::metrics::EngineMetrics;
use crate::queue::JobQueue;
use crate::telemetry::EngineTelemetry;

/// Terminal jobs retained for inspection after their run.
const HISTORY_LIMIT: usize = 256;

/// Errors surfaced by engine processing.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Handler rejected or failed the job.
    #[error("job processing failed: {0}")]
    Processing(String),
    /// Handler has no branch for the job's dispatch key.
    #[error("unknown job type: {0}")]
    UnknownJobType(String),
    /// The drain loop hit its per-run budget with work still queued.
    #[error("engine {engine} exhausted its drain budget of {budget} jobs")]
    DrainBudgetExhausted {
        /// Engine that gave up.
        engine: String,
        /// Budget that was exhausted.
        budget: u32,
    },
}

/// Lifecycle state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    /// Constructed, never run.
    Idle,
    /// Currently draining its queue.
    Running,
    /// Last run drained the queue cleanly.
    Completed,
    /// Last run exhausted its drain budget.
    Failed,
    /// Runs are suspended until resumed.
    Paused,
}

impl EngineStatus {
    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }
}

/// Retry and drain limits applied by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts allowed per job before it is marked failed.
    #[serde(default = "RetryPolicy::default_max_attempts")]
    pub max_attempts: u32,
    /// Jobs one `run()` may attempt before giving up on the drain.
    #[serde(default = "RetryPolicy::default_max_drain")]
    pub max_drain: u32,
}

impl RetryPolicy {
    /// Creates a policy, clamping both limits to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, max_drain: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_drain: max_drain.max(1),
        }
    }

    const fn default_max_attempts() -> u32 {
        3
    }

    const fn default_max_drain() -> u32 {
        10_000
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            max_drain: Self::default_max_drain(),
        }
    }
}

/// Processes jobs dequeued by an engine.
pub trait JobHandler: Send + Sync {
    /// Handles one job attempt, returning the result payload on success.
    ///
    /// A result object may include a `followups` array of
    /// `{ "job_type", "payload", "priority" }` entries; the engine admits
    /// each one and drains it within the same run.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the attempt fails; the engine
    /// re-queues the job until its attempt budget runs out.
    fn handle(&self, job: &Job) -> Result<Value, EngineError>;
}

impl<F> JobHandler for F
where
    F: Fn(&Job) -> Result<Value, EngineError> + Send + Sync,
{
    fn handle(&self, job: &Job) -> Result<Value, EngineError> {
        self(job)
    }
}

/// Callback invoked with the report after every run.
pub type ReportSubscriber = Arc<dyn Fn(&EngineReport) -> anyhow::Result<()> + Send + Sync>;

/// Outcome of a single `run()` drain.
#[derive(Debug, Clone, Serialize)]
pub struct EngineReport {
    /// Engine that produced the report.
    pub engine: String,
    /// Identifier of this run.
    pub run_id: Uuid,
    /// Handler attempts executed during the run.
    pub processed: u64,
    /// Jobs that succeeded during the run.
    pub succeeded: u64,
    /// Jobs that exhausted their attempt budget during the run.
    pub failed: u64,
    /// Share of this run's attempts that succeeded, in `0.0..=100.0`.
    pub success_rate: f64,
    /// Revenue summed from `"revenue"` fields of successful results.
    pub revenue: f64,
    /// Jobs that reached a terminal state, in completion order.
    pub jobs: Vec<Job>,
    /// Set when the run ended by exhausting its drain budget.
    pub error: Option<String>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

/// Point-in-time engine state for status queries and dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    /// Engine name.
    pub name: String,
    /// What the engine works toward.
    pub objective: String,
    /// Current lifecycle state.
    pub status: EngineStatus,
    /// Jobs waiting in the queue.
    pub queue_depth: usize,
    /// Cumulative processing counters.
    pub metrics: EngineMetrics,
    /// Share of all attempts that succeeded, in `0.0..=100.0`.
    pub success_rate: f64,
    /// When the engine last finished a run.
    pub last_run: Option<DateTime<Utc>>,
}

/// A named worker owning a prioritized job queue.
pub struct Engine {
    name: String,
    objective: String,
    status: EngineStatus,
    queue: JobQueue,
    metrics: EngineMetrics,
    policy: RetryPolicy,
    handler: Arc<dyn JobHandler>,
    subscribers: Vec<ReportSubscriber>,
    history: VecDeque<Job>,
    last_run: Option<DateTime<Utc>>,
    telemetry: Option<EngineTelemetry>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("queue_depth", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an idle engine with the default retry policy.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        objective: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            objective: objective.into(),
            status: EngineStatus::Idle,
            queue: JobQueue::new(),
            metrics: EngineMetrics::default(),
            policy: RetryPolicy::default(),
            handler,
            subscribers: Vec::new(),
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            last_run: None,
            telemetry: None,
        }
    }

    /// Returns a builder for this engine.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EngineBuilder {
        EngineBuilder::new(name)
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attaches a telemetry handle.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: EngineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Engine name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the engine works toward.
    #[must_use]
    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> EngineStatus {
        self.status
    }

    /// Cumulative processing counters.
    #[must_use]
    pub const fn metrics(&self) -> EngineMetrics {
        self.metrics
    }

    /// Retry and drain limits in force.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Jobs waiting in the queue.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Registers a callback invoked with the report after every run.
    /// Callback errors are logged and never propagate into the drain.
    pub fn subscribe(&mut self, subscriber: ReportSubscriber) {
        self.subscribers.push(subscriber);
    }

    /// Admits a job at the given priority, returning its ticket. The job
    /// inherits the engine's attempt budget.
    pub fn enqueue(&mut self, job_type: impl Into<String>, payload: Value, priority: u8) -> JobTicket {
        let job = Job::new(job_type, payload, priority, self.policy.max_attempts);
        let ticket = JobTicket {
            id: job.id,
            status: JobStatus::Queued,
        };
        let job_type = job.job_type.clone();
        let priority = job.priority;
        self.queue.admit(job);
        self.record(
            LogLevel::Debug,
            "engine.job.enqueued",
            json!({
                "engine": self.name,
                "job_id": ticket.id,
                "job_type": job_type,
                "priority": priority,
                "queue_depth": self.queue.len(),
            }),
        );
        ticket
    }

    /// Cancels a waiting job. Returns false when the id does not match a
    /// queued job; running and terminal jobs cannot be withdrawn.
    pub fn cancel(&mut self, id: JobId) -> bool {
        let cancelled = self.queue.cancel(id);
        if cancelled {
            self.record(
                LogLevel::Info,
                "engine.job.cancelled",
                json!({ "engine": self.name, "job_id": id }),
            );
        }
        cancelled
    }

    /// Suspends processing; `run()` becomes a no-op until [`Self::resume`].
    pub fn pause(&mut self) {
        self.status = EngineStatus::Paused;
    }

    /// Lifts a suspension.
    pub fn resume(&mut self) {
        if self.status == EngineStatus::Paused {
            self.status = EngineStatus::Idle;
        }
    }

    /// Drains the queue until empty, retrying failures within each job's
    /// attempt budget. Work enqueued by handlers mid-drain is processed in
    /// the same run. Returns the run report; engine failures are captured
    /// in it, never thrown.
    #[allow(
        clippy::too_many_lines,
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation
    )]
    pub fn run(&mut self) -> EngineReport {
        let run_id = Uuid::new_v4();
        if self.status == EngineStatus::Paused {
            self.record(
                LogLevel::Warn,
                "engine.run.skipped",
                json!({ "engine": self.name, "reason": "paused" }),
            );
            return self.empty_report(run_id);
        }

        self.status = EngineStatus::Running;
        let mut completed: Vec<Job> = Vec::new();
        let mut attempts_this_run: u32 = 0;
        let mut budget_exhausted = false;

        loop {
            if attempts_this_run >= self.policy.max_drain {
                if self.queue.is_empty() {
                    break;
                }
                budget_exhausted = true;
                break;
            }
            let Some(mut job) = self.queue.pop() else {
                break;
            };
            if job.status == JobStatus::Cancelled {
                job.finished_at = Some(Utc::now());
                self.remember(job.clone());
                completed.push(job);
                continue;
            }

            attempts_this_run += 1;
            job.status = JobStatus::Running;
            job.attempts += 1;
            job.started_at = Some(Utc::now());
            let clock = Instant::now();
            let outcome = self.handler.handle(&job);
            let elapsed = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
            self.metrics.processed += 1;
            self.metrics.runtime_ms = self.metrics.runtime_ms.saturating_add(elapsed);

            match outcome {
                Ok(result) => {
                    self.spawn_followups(&job, &result);
                    job.status = JobStatus::Succeeded;
                    job.result = Some(result);
                    job.error = None;
                    job.finished_at = Some(Utc::now());
                    self.metrics.succeeded += 1;
                    self.remember(job.clone());
                    completed.push(job);
                }
                Err(err) if job.retryable() => {
                    job.status = JobStatus::Queued;
                    job.error = Some(err.to_string());
                    self.record(
                        LogLevel::Warn,
                        "engine.job.retried",
                        json!({
                            "engine": self.name,
                            "job_id": job.id,
                            "job_type": job.job_type,
                            "attempt": job.attempts,
                            "max_attempts": job.max_attempts,
                            "error": err.to_string(),
                        }),
                    );
                    // Fresh admission sequence: the retry waits behind
                    // everything already queued at its priority.
                    self.queue.admit(job);
                }
                Err(err) => {
                    job.status = JobStatus::Failed;
                    job.error = Some(err.to_string());
                    job.finished_at = Some(Utc::now());
                    self.metrics.failed += 1;
                    self.record(
                        LogLevel::Error,
                        "engine.job.failed",
                        json!({
                            "engine": self.name,
                            "job_id": job.id,
                            "job_type": job.job_type,
                            "attempts": job.attempts,
                            "error": err.to_string(),
                        }),
                    );
                    self.remember(job.clone());
                    completed.push(job);
                }
            }
        }

        let error = if budget_exhausted {
            let err = EngineError::DrainBudgetExhausted {
                engine: self.name.clone(),
                budget: self.policy.max_drain,
            };
            self.status = EngineStatus::Failed;
            self.record(
                LogLevel::Error,
                "engine.run.budget_exhausted",
                json!({
                    "engine": self.name,
                    "budget": self.policy.max_drain,
                    "queue_depth": self.queue.len(),
                }),
            );
            Some(err.to_string())
        } else {
            self.status = EngineStatus::Completed;
            None
        };
        self.last_run = Some(Utc::now());

        let succeeded = completed
            .iter()
            .filter(|job| job.status == JobStatus::Succeeded)
            .count() as u64;
        let failed = completed
            .iter()
            .filter(|job| job.status == JobStatus::Failed)
            .count() as u64;
        let processed = u64::from(attempts_this_run);
        let success_rate = if processed == 0 {
            0.0
        } else {
            succeeded as f64 / processed as f64 * 100.0
        };
        let revenue = completed
            .iter()
            .filter(|job| job.status == JobStatus::Succeeded)
            .filter_map(|job| job.result.as_ref())
            .filter_map(|result| result.get("revenue"))
            .filter_map(Value::as_f64)
            .sum();

        let report = EngineReport {
            engine: self.name.clone(),
            run_id,
            processed,
            succeeded,
            failed,
            success_rate,
            revenue,
            jobs: completed,
            error,
            finished_at: Utc::now(),
        };

        for subscriber in &self.subscribers {
            if let Err(err) = subscriber(&report) {
                if let Some(telemetry) = &self.telemetry {
                    let _ = telemetry.log(
                        LogLevel::Warn,
                        "engine.subscriber.failed",
                        json!({ "engine": self.name, "error": err.to_string() }),
                    );
                }
            }
        }

        if let Some(telemetry) = &self.telemetry {
            telemetry.run_completed(&report, self.status.label());
        }
        report
    }

    /// Point-in-time state for status queries; never mutates the engine.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            name: self.name.clone(),
            objective: self.objective.clone(),
            status: self.status,
            queue_depth: self.queue.len(),
            metrics: self.metrics,
            success_rate: self.metrics.success_rate(),
            last_run: self.last_run,
        }
    }

    /// Most recent terminal jobs, newest last, up to `limit`.
    #[must_use]
    pub fn recent_jobs(&self, limit: usize) -> Vec<Job> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Admits follow-up jobs declared in a successful result. Entries
    /// without a `job_type` string are ignored; priority defaults to the
    /// parent's.
    fn spawn_followups(&mut self, parent: &Job, result: &Value) {
        let Some(entries) = result.get("followups").and_then(Value::as_array) else {
            return;
        };
        for entry in entries {
            let Some(job_type) = entry.get("job_type").and_then(Value::as_str) else {
                continue;
            };
            let payload = entry
                .get("payload")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let priority = entry
                .get("priority")
                .and_then(Value::as_u64)
                .and_then(|p| u8::try_from(p).ok())
                .unwrap_or(parent.priority);
            let job = Job::new(job_type, payload, priority, self.policy.max_attempts);
            self.record(
                LogLevel::Debug,
                "engine.job.enqueued",
                json!({
                    "engine": self.name,
                    "job_id": job.id,
                    "job_type": job.job_type,
                    "priority": job.priority,
                    "parent": parent.id,
                }),
            );
            self.queue.admit(job);
        }
    }

    fn remember(&mut self, job: Job) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(job);
    }

    fn empty_report(&self, run_id: Uuid) -> EngineReport {
        EngineReport {
            engine: self.name.clone(),
            run_id,
            processed: 0,
            succeeded: 0,
            failed: 0,
            success_rate: 0.0,
            revenue: 0.0,
            jobs: Vec::new(),
            error: None,
            finished_at: Utc::now(),
        }
    }

    fn record(&self, level: LogLevel, event_type: &str, payload: Value) {
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(level, event_type, payload.clone());
            let _ = telemetry.event(event_type, payload);
        }
    }
}

/// Builder assembling an [`Engine`].
pub struct EngineBuilder {
    name: String,
    objective: String,
    policy: RetryPolicy,
    handler: Option<Arc<dyn JobHandler>>,
    telemetry: Option<EngineTelemetry>,
}

impl EngineBuilder {
    /// Creates a builder for the named engine.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objective: String::new(),
            policy: RetryPolicy::default(),
            handler: None,
            telemetry: None,
        }
    }

    /// Sets the engine objective shown on dashboards.
    #[must_use]
    pub fn objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = objective.into();
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the job handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Attaches a telemetry handle.
    #[must_use]
    pub fn telemetry(mut self, telemetry: EngineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Builds the engine. Without an explicit handler the engine
    /// acknowledges every job with its dispatch key.
    #[must_use]
    pub fn build(self) -> Engine {
        let handler = self.handler.unwrap_or_else(|| {
            Arc::new(|job: &Job| Ok(json!({ "acknowledged": job.job_type })))
        });
        let mut engine = Engine::new(self.name, self.objective, handler);
        engine.policy = self.policy;
        engine.telemetry = self.telemetry;
        engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn succeed_engine() -> Engine {
        Engine::builder("test")
            .objective("unit tests")
            .handler(Arc::new(|job: &Job| {
                Ok(json!({ "handled": job.job_type }))
            }))
            .build()
    }

    #[test]
    fn drains_in_priority_then_admission_order() {
        let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        let mut engine = Engine::builder("ordering")
            .handler(Arc::new(move |job: &Job| {
                seen.lock().push(job.job_type.clone());
                Ok(json!({}))
            }))
            .build();
        engine.enqueue("low.first", json!({}), 5);
        engine.enqueue("high", json!({}), 9);
        engine.enqueue("low.second", json!({}), 5);
        let report = engine.run();
        assert_eq!(report.processed, 3);
        assert_eq!(
            *order.lock(),
            vec!["high".to_string(), "low.first".to_string(), "low.second".to_string()]
        );
    }

    #[test]
    fn failing_job_consumes_full_attempt_budget() {
        let mut engine = Engine::builder("retry")
            .handler(Arc::new(|_: &Job| {
                Err(EngineError::Processing("downstream offline".into()))
            }))
            .build();
        engine.enqueue("flaky", json!({}), 5);
        let report = engine.run();
        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 0);
        assert_eq!(engine.metrics().processed, 3);
        assert_eq!(engine.metrics().failed, 1);
        let failed = &report.jobs[0];
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempts, 3);
        assert_eq!(failed.error.as_deref(), Some("job processing failed: downstream offline"));
    }

    #[test]
    fn success_rate_is_zero_without_attempts() {
        let mut engine = succeed_engine();
        let report = engine.run();
        assert_eq!(report.processed, 0);
        assert!((report.success_rate - 0.0).abs() < f64::EPSILON);
        assert!((engine.snapshot().success_rate - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn retry_goes_to_the_back_of_its_priority_tier() {
        let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        let mut engine = Engine::builder("requeue")
            .handler(Arc::new(move |job: &Job| {
                seen.lock().push(job.job_type.clone());
                if job.job_type == "flaky" && job.attempts == 1 {
                    Err(EngineError::Processing("first attempt fails".into()))
                } else {
                    Ok(json!({}))
                }
            }))
            .build();
        engine.enqueue("flaky", json!({}), 5);
        engine.enqueue("steady", json!({}), 5);
        let report = engine.run();
        // flaky fails once, requeues behind steady, then succeeds.
        assert_eq!(
            *order.lock(),
            vec!["flaky".to_string(), "steady".to_string(), "flaky".to_string()]
        );
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn drain_budget_caps_runaway_retries() {
        let mut engine = Engine::builder("bounded")
            .policy(RetryPolicy::new(10, 3))
            .handler(Arc::new(|_: &Job| {
                Err(EngineError::Processing("never succeeds".into()))
            }))
            .build();
        engine.enqueue("stuck", json!({}), 5);
        let report = engine.run();
        assert_eq!(report.processed, 3);
        assert_eq!(engine.status(), EngineStatus::Failed);
        let error = report.error.expect("budget error recorded");
        assert!(error.contains("drain budget"));
        assert_eq!(engine.queue_depth(), 1);
    }

    #[test]
    fn cancelled_jobs_are_skipped_at_dequeue() {
        let mut engine = succeed_engine();
        let ticket = engine.enqueue("doomed", json!({}), 8);
        engine.enqueue("kept", json!({}), 5);
        assert!(engine.cancel(ticket.id));
        let report = engine.run();
        assert_eq!(report.processed, 1);
        assert_eq!(report.succeeded, 1);
        let cancelled = report
            .jobs
            .iter()
            .find(|job| job.id == ticket.id)
            .expect("cancelled job reported");
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.result.is_none());
    }

    #[test]
    fn handler_followups_drain_in_same_run() {
        let mut engine = Engine::builder("recursive")
            .handler(Arc::new(|job: &Job| {
                if job.job_type == "seed" {
                    Ok(json!({
                        "followups": [
                            { "job_type": "child", "payload": { "n": 1 }, "priority": 9 }
                        ]
                    }))
                } else {
                    Ok(json!({ "handled": job.job_type }))
                }
            }))
            .build();
        engine.enqueue("seed", json!({}), 5);
        let report = engine.run();
        assert_eq!(report.processed, 2);
        assert_eq!(engine.queue_depth(), 0);
        assert_eq!(engine.status(), EngineStatus::Completed);
        assert!(report.jobs.iter().any(|job| job.job_type == "child"));
    }

    #[test]
    fn drain_budget_caps_recursive_followups() {
        let mut engine = Engine::builder("spinner")
            .policy(RetryPolicy::new(3, 5))
            .handler(Arc::new(|_: &Job| {
                Ok(json!({ "followups": [{ "job_type": "again" }] }))
            }))
            .build();
        engine.enqueue("again", json!({}), 5);
        let report = engine.run();
        assert_eq!(report.processed, 5);
        assert_eq!(engine.status(), EngineStatus::Failed);
        assert!(report.error.is_some());
        assert_eq!(engine.queue_depth(), 1);
    }

    #[test]
    fn snapshot_is_pure() {
        let mut engine = succeed_engine();
        engine.enqueue("steady", json!({}), 5);
        engine.run();
        let first = engine.snapshot();
        let second = engine.snapshot();
        assert_eq!(first, second);
        assert_eq!(first.queue_depth, 0);
        assert_eq!(first.metrics.succeeded, 1);
    }

    #[test]
    fn subscriber_error_never_poisons_the_run() {
        let calls: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let first_calls = Arc::clone(&calls);
        let second_calls = Arc::clone(&calls);
        let mut engine = succeed_engine();
        engine.subscribe(Arc::new(move |_report| {
            *first_calls.lock() += 1;
            anyhow::bail!("subscriber exploded")
        }));
        engine.subscribe(Arc::new(move |_report| {
            *second_calls.lock() += 1;
            Ok(())
        }));
        engine.enqueue("steady", json!({}), 5);
        let report = engine.run();
        assert_eq!(report.succeeded, 1);
        assert_eq!(*calls.lock(), 2);
        assert_eq!(engine.status(), EngineStatus::Completed);
    }

    #[test]
    fn revenue_is_summed_from_successful_results() {
        let mut engine = Engine::builder("commerce")
            .handler(Arc::new(|job: &Job| {
                Ok(json!({ "revenue": job.payload["amount"] }))
            }))
            .build();
        engine.enqueue("sale", json!({ "amount": 120.0 }), 5);
        engine.enqueue("sale", json!({ "amount": 79.5 }), 5);
        let report = engine.run();
        assert!((report.revenue - 199.5).abs() < f64::EPSILON);
    }

    #[test]
    fn paused_engine_skips_runs_until_resumed() {
        let mut engine = succeed_engine();
        engine.enqueue("waiting", json!({}), 5);
        engine.pause();
        let report = engine.run();
        assert_eq!(report.processed, 0);
        assert_eq!(engine.queue_depth(), 1);
        engine.resume();
        let report = engine.run();
        assert_eq!(report.succeeded, 1);
    }
}
