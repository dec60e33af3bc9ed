//! Execution cycle linking the coordinator, the bus, and the domain fleet.
//!
//! One cycle runs the coordinator engine, drains the bus into the fleet,
//! then runs each domain engine in registration order. Failures inside any
//! unit are captured into the [`ExecutionCycle`] record; the cycle itself
//! never throws, so one stalled engine cannot take the control plane down
//! with it.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use meridian_engine::{Engine, EngineReport, EngineSnapshot, Job, JobStatus, ReportSubscriber};
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::fleet::EngineFleet;
use crate::message::RoutingLevel;
use crate::routing::{MessageBus, RoutingError};
use crate::telemetry::BusTelemetry;

/// Cycle records retained for inspection.
const CYCLE_LIMIT: usize = 128;

/// Terminal state of an execution cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Every unit drained cleanly.
    Completed,
    /// At least one unit stalled; the record carries the reasons.
    Failed,
}

impl CycleStatus {
    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Aggregated record of one orchestrator cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionCycle {
    /// Cycle identifier.
    pub id: Uuid,
    /// Position in the run history, starting at 1.
    pub sequence: u64,
    /// Terminal state of the cycle.
    pub status: CycleStatus,
    /// Handler attempts executed across all engines.
    pub jobs_processed: u64,
    /// Jobs that succeeded across all engines.
    pub jobs_succeeded: u64,
    /// Jobs that exhausted their attempt budget.
    pub jobs_failed: u64,
    /// Revenue summed from successful results.
    pub revenue: f64,
    /// Messages the bus handed to engines.
    pub messages_routed: u64,
    /// Messages the bus could not deliver.
    pub routing_failures: u64,
    /// Stall reasons, joined, when the cycle failed.
    pub error: Option<String>,
    /// When the cycle began.
    pub started_at: DateTime<Utc>,
    /// When the cycle finished.
    pub finished_at: DateTime<Utc>,
}

/// Outbound message produced by a result translator.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    /// Routing tier for the message.
    pub level: RoutingLevel,
    /// Destination engine name.
    pub destination: String,
    /// Message payload; include a `job_type` to pick the handler branch.
    pub payload: Value,
    /// Urgency in `1..=10`.
    pub priority: u8,
}

impl MessageDraft {
    /// Creates a draft.
    #[must_use]
    pub fn new(
        level: RoutingLevel,
        destination: impl Into<String>,
        payload: Value,
        priority: u8,
    ) -> Self {
        Self {
            level,
            destination: destination.into(),
            payload,
            priority,
        }
    }
}

/// Maps a successfully completed job to an outbound message, or `None`
/// when the result should not travel further.
pub type ResultTranslator = Arc<dyn Fn(&Job) -> Option<MessageDraft> + Send + Sync>;

#[derive(Debug, Default)]
struct CycleTotals {
    processed: u64,
    succeeded: u64,
    failed: u64,
    revenue: f64,
}

impl CycleTotals {
    fn absorb(&mut self, report: &EngineReport) {
        self.processed += report.processed;
        self.succeeded += report.succeeded;
        self.failed += report.failed;
        self.revenue += report.revenue;
    }
}

/// Runs the coordinator, the bus, and the domain fleet as one bulkheaded
/// cycle.
#[derive(Debug)]
pub struct Orchestrator {
    coordinator: Engine,
    fleet: EngineFleet,
    bus: MessageBus,
    cycles: VecDeque<ExecutionCycle>,
    sequence: u64,
    telemetry: Option<BusTelemetry>,
}

impl Orchestrator {
    /// Creates an orchestrator around a coordinator engine and a bus.
    #[must_use]
    pub fn new(coordinator: Engine, bus: MessageBus) -> Self {
        Self {
            coordinator,
            fleet: EngineFleet::new(),
            bus,
            cycles: VecDeque::with_capacity(CYCLE_LIMIT),
            sequence: 0,
            telemetry: None,
        }
    }

    /// Attaches a telemetry handle.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: BusTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Registers a domain engine; cycles run engines in registration order.
    pub fn register_engine(&mut self, engine: Engine) {
        self.fleet.register(engine);
    }

    /// The coordinator engine.
    #[must_use]
    pub const fn coordinator(&self) -> &Engine {
        &self.coordinator
    }

    /// The coordinator engine, mutably.
    pub fn coordinator_mut(&mut self) -> &mut Engine {
        &mut self.coordinator
    }

    /// The domain fleet.
    #[must_use]
    pub const fn fleet(&self) -> &EngineFleet {
        &self.fleet
    }

    /// Looks up the coordinator or a fleet engine by name, mutably.
    pub fn engine_mut(&mut self, name: &str) -> Option<&mut Engine> {
        if self.coordinator.name() == name {
            Some(&mut self.coordinator)
        } else {
            self.fleet.get_mut(name)
        }
    }

    /// A cloneable handle to the bus.
    #[must_use]
    pub fn bus(&self) -> MessageBus {
        self.bus.clone()
    }

    /// Subscribes a translator to the named engine: every job the engine
    /// completes successfully is offered to the translator, and drafts it
    /// returns are sent on the bus with the engine as source.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::UnknownEngine`] when no engine carries the
    /// name.
    pub fn connect(
        &mut self,
        engine_name: &str,
        translator: ResultTranslator,
    ) -> Result<(), RoutingError> {
        let bus = self.bus.clone();
        let source = engine_name.to_string();
        let subscriber: ReportSubscriber = Arc::new(move |report: &EngineReport| {
            for job in report
                .jobs
                .iter()
                .filter(|job| job.status == JobStatus::Succeeded)
            {
                if let Some(draft) = translator(job) {
                    bus.send_message(
                        draft.level,
                        source.clone(),
                        draft.destination,
                        draft.payload,
                        draft.priority,
                    );
                }
            }
            Ok(())
        });
        if self.coordinator.name() == engine_name {
            self.coordinator.subscribe(subscriber);
            return Ok(());
        }
        match self.fleet.get_mut(engine_name) {
            Some(engine) => {
                engine.subscribe(subscriber);
                Ok(())
            }
            None => Err(RoutingError::UnknownEngine(engine_name.to_string())),
        }
    }

    /// Runs one full cycle: coordinator, bus drain, then each domain engine
    /// in registration order. Unit failures are captured into the returned
    /// record, never propagated. Messages sent by domain engines during
    /// their run stay queued for the next cycle.
    #[instrument(skip(self))]
    pub fn run_cycle(&mut self) -> ExecutionCycle {
        self.sequence += 1;
        let started_at = Utc::now();
        let mut totals = CycleTotals::default();
        let mut stalls: Vec<String> = Vec::new();

        let coordinator_report = self.coordinator.run();
        if let Some(err) = &coordinator_report.error {
            stalls.push(format!("{}: {err}", coordinator_report.engine));
        }
        totals.absorb(&coordinator_report);

        let drain = self.bus.process(&mut self.fleet);

        for engine in self.fleet.engines_mut() {
            let report = engine.run();
            if let Some(err) = &report.error {
                stalls.push(format!("{}: {err}", report.engine));
            }
            totals.absorb(&report);
        }

        let status = if stalls.is_empty() {
            CycleStatus::Completed
        } else {
            CycleStatus::Failed
        };
        let error = if stalls.is_empty() {
            None
        } else {
            Some(stalls.join("; "))
        };
        if let Some(err) = &error {
            tracing::warn!(sequence = self.sequence, "execution cycle degraded: {err}");
        }

        let cycle = ExecutionCycle {
            id: Uuid::new_v4(),
            sequence: self.sequence,
            status,
            jobs_processed: totals.processed,
            jobs_succeeded: totals.succeeded,
            jobs_failed: totals.failed,
            revenue: totals.revenue,
            messages_routed: drain.routed,
            routing_failures: drain.failed,
            error,
            started_at,
            finished_at: Utc::now(),
        };
        if let Some(telemetry) = &self.telemetry {
            telemetry.cycle_completed(&cycle);
        }
        self.remember(cycle.clone());
        cycle
    }

    /// The most recent cycle record, if any cycle has run.
    #[must_use]
    pub fn last_cycle(&self) -> Option<&ExecutionCycle> {
        self.cycles.back()
    }

    /// Retained cycle records, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ExecutionCycle> {
        self.cycles.iter().cloned().collect()
    }

    /// Snapshots of the coordinator and every fleet engine, coordinator
    /// first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<EngineSnapshot> {
        let mut all = vec![self.coordinator.snapshot()];
        all.extend(self.fleet.snapshots());
        all
    }

    fn remember(&mut self, cycle: ExecutionCycle) {
        if self.cycles.len() == CYCLE_LIMIT {
            self.cycles.pop_front();
        }
        self.cycles.push_back(cycle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_engine::{EngineError, RetryPolicy};
    use serde_json::json;

    fn ack_engine(name: &str) -> Engine {
        Engine::builder(name).objective("test").build()
    }

    #[test]
    fn coordinator_results_flow_into_domain_engines() {
        let bus = MessageBus::new();
        let coordinator = Engine::builder("coordinator")
            .handler(Arc::new(|job: &Job| {
                Ok(json!({ "brief": job.payload["topic"] }))
            }))
            .build();
        let mut orchestrator = Orchestrator::new(coordinator, bus);
        orchestrator.register_engine(ack_engine("commerce"));
        orchestrator
            .connect(
                "coordinator",
                Arc::new(|job: &Job| {
                    (job.job_type == "strategy.brief").then(|| {
                        MessageDraft::new(
                            RoutingLevel::Domain,
                            "commerce",
                            json!({ "job_type": "commerce.order", "brief": job.result }),
                            7,
                        )
                    })
                }),
            )
            .unwrap();

        orchestrator
            .coordinator_mut()
            .enqueue("strategy.brief", json!({ "topic": "q3 launch" }), 6);
        let first = orchestrator.run_cycle();
        // The coordinator ran before the drain, so its message is routed in
        // the same cycle and the commerce engine handles it immediately.
        assert_eq!(first.status, CycleStatus::Completed);
        assert_eq!(first.messages_routed, 1);
        assert_eq!(first.jobs_processed, 2);
        let commerce = orchestrator.fleet().get("commerce").unwrap();
        assert_eq!(commerce.metrics().succeeded, 1);
    }

    #[test]
    fn stalled_engine_degrades_cycle_without_stopping_it() {
        let bus = MessageBus::new();
        let mut orchestrator = Orchestrator::new(ack_engine("coordinator"), bus);
        let mut stuck = Engine::builder("stuck")
            .policy(RetryPolicy::new(10, 2))
            .handler(Arc::new(|_: &Job| {
                Err(EngineError::Processing("wedged".into()))
            }))
            .build();
        stuck.enqueue("wedge", json!({}), 5);
        orchestrator.register_engine(stuck);
        let mut healthy = ack_engine("healthy");
        healthy.enqueue("fine", json!({}), 5);
        orchestrator.register_engine(healthy);

        let cycle = orchestrator.run_cycle();
        assert_eq!(cycle.status, CycleStatus::Failed);
        assert!(cycle.error.as_deref().unwrap_or_default().contains("stuck"));
        // The healthy engine still ran after the stall.
        let healthy = orchestrator.fleet().get("healthy").unwrap();
        assert_eq!(healthy.metrics().succeeded, 1);
    }

    #[test]
    fn routing_failures_count_without_failing_the_cycle() {
        let bus = MessageBus::new();
        bus.send_message(RoutingLevel::Execution, "test", "ghost", json!({}), 5);
        let mut orchestrator = Orchestrator::new(ack_engine("coordinator"), bus);
        orchestrator.register_engine(ack_engine("real"));
        let cycle = orchestrator.run_cycle();
        assert_eq!(cycle.status, CycleStatus::Completed);
        assert_eq!(cycle.routing_failures, 1);
        assert_eq!(cycle.messages_routed, 0);
    }

    #[test]
    fn connecting_an_unknown_engine_is_rejected() {
        let mut orchestrator = Orchestrator::new(ack_engine("coordinator"), MessageBus::new());
        let result = orchestrator.connect("ghost", Arc::new(|_: &Job| None));
        assert!(matches!(result, Err(RoutingError::UnknownEngine(name)) if name == "ghost"));
    }

    #[test]
    fn cycle_history_is_bounded() {
        let mut orchestrator = Orchestrator::new(ack_engine("coordinator"), MessageBus::new());
        for _ in 0..140 {
            orchestrator.run_cycle();
        }
        let history = orchestrator.history();
        assert_eq!(history.len(), 128);
        assert_eq!(history.last().map(|c| c.sequence), Some(140));
    }
}
