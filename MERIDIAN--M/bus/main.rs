//! Leveled message bus routing payloads into engine queues.
//!
//! The bus owns every message until a drain hands it to its destination
//! engine. Draining follows the same discipline as an engine queue: higher
//! priority first, acceptance order within a priority, and messages sent
//! while the drain is running are delivered by that same drain. A message
//! with an unknown destination becomes a [`RoutingFailure`] record; it
//! never aborts the rest of the batch.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use shared_logging::LogLevel;
use thiserror::Error;
use uuid::Uuid;

use crate::fleet::EngineFleet;
use crate::message::{BusMessage, RoutingFailure, RoutingLevel};
use crate::telemetry::BusTelemetry;

/// Dispatch key used when a routed payload does not name one.
pub const DEFAULT_JOB_TYPE: &str = "bus.dispatch";

/// Processed messages retained for inspection.
const DELIVERED_LIMIT: usize = 512;

/// Errors surfaced by message routing.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// No engine is registered under the destination name.
    #[error("unknown destination: {0}")]
    UnknownDestination(String),
    /// No engine is registered under the name given to a translator link.
    #[error("unknown engine: {0}")]
    UnknownEngine(String),
}

/// Outcome of one bus drain.
#[derive(Debug, Clone, Serialize)]
pub struct BusDrainReport {
    /// Messages handed to an engine queue.
    pub routed: u64,
    /// Messages whose destination could not be resolved.
    pub failed: u64,
    /// Routed message counts per destination, in first-seen order.
    pub destinations: IndexMap<String, u64>,
    /// Failure records produced by this drain.
    pub failures: Vec<RoutingFailure>,
    /// When the drain finished.
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct BusState {
    queue: Vec<BusMessage>,
    delivered: VecDeque<BusMessage>,
    failures: Vec<RoutingFailure>,
    next_seq: u64,
}

impl BusState {
    fn accept(&mut self, mut message: BusMessage) -> Uuid {
        message.seq = self.next_seq;
        self.next_seq += 1;
        let id = message.id;
        self.queue.push(message);
        self.queue
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        id
    }

    fn pop(&mut self) -> Option<BusMessage> {
        if self.queue.is_empty() {
            None
        } else {
            Some(self.queue.remove(0))
        }
    }

    fn remember(&mut self, message: BusMessage) {
        if self.delivered.len() == DELIVERED_LIMIT {
            self.delivered.pop_front();
        }
        self.delivered.push_back(message);
    }
}

/// Cheaply cloneable handle to the shared message bus.
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<Mutex<BusState>>,
    telemetry: Option<BusTelemetry>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl MessageBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a telemetry handle.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: BusTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Accepts a message for routing and returns its id. The priority is
    /// clamped into `1..=10`.
    pub fn send_message(
        &self,
        level: RoutingLevel,
        source: impl Into<String>,
        destination: impl Into<String>,
        payload: Value,
        priority: u8,
    ) -> Uuid {
        let message = BusMessage::new(level, source, destination, payload, priority);
        let summary = json!({
            "message_id": message.id,
            "level": message.level.label(),
            "source": message.source,
            "destination": message.destination,
            "priority": message.priority,
            "correlation_id": message.correlation_id,
        });
        let id = self.inner.lock().accept(message);
        self.record(LogLevel::Debug, "bus.message.sent", summary);
        id
    }

    /// Messages waiting to be drained.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Waiting messages in drain order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BusMessage> {
        self.inner.lock().queue.clone()
    }

    /// Every routing failure recorded since construction.
    #[must_use]
    pub fn failures(&self) -> Vec<RoutingFailure> {
        self.inner.lock().failures.clone()
    }

    /// Most recently delivered messages, newest last, up to `limit`.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<BusMessage> {
        let state = self.inner.lock();
        let skip = state.delivered.len().saturating_sub(limit);
        state.delivered.iter().skip(skip).cloned().collect()
    }

    /// Drains the queue, enqueuing each message as a job on its destination
    /// engine. The dispatch key comes from the payload's `job_type` field,
    /// falling back to [`DEFAULT_JOB_TYPE`]; the job inherits the message
    /// priority. Unknown destinations are recorded and skipped.
    pub fn process(&self, fleet: &mut EngineFleet) -> BusDrainReport {
        let mut routed: u64 = 0;
        let mut failed: u64 = 0;
        let mut destinations: IndexMap<String, u64> = IndexMap::new();
        let mut drain_failures: Vec<RoutingFailure> = Vec::new();

        loop {
            // The lock is released before touching the fleet so engine
            // subscribers holding a bus handle cannot deadlock a send.
            let Some(mut message) = self.inner.lock().pop() else {
                break;
            };
            match fleet.get_mut(&message.destination) {
                Some(engine) => {
                    let job_type = message
                        .payload
                        .get("job_type")
                        .and_then(Value::as_str)
                        .unwrap_or(DEFAULT_JOB_TYPE)
                        .to_string();
                    engine.enqueue(job_type.clone(), message.payload.clone(), message.priority);
                    message.processed = true;
                    routed += 1;
                    *destinations.entry(message.destination.clone()).or_insert(0) += 1;
                    self.record(
                        LogLevel::Debug,
                        "bus.message.routed",
                        json!({
                            "message_id": message.id,
                            "destination": message.destination,
                            "job_type": job_type,
                            "level": message.level.label(),
                        }),
                    );
                    self.inner.lock().remember(message);
                }
                None => {
                    failed += 1;
                    let failure = RoutingFailure {
                        message_id: message.id,
                        destination: message.destination.clone(),
                        reason: RoutingError::UnknownDestination(message.destination.clone())
                            .to_string(),
                        occurred_at: Utc::now(),
                    };
                    self.record(
                        LogLevel::Warn,
                        "bus.routing.failed",
                        json!({
                            "message_id": failure.message_id,
                            "destination": failure.destination,
                            "reason": failure.reason,
                        }),
                    );
                    drain_failures.push(failure.clone());
                    self.inner.lock().failures.push(failure);
                }
            }
        }

        let report = BusDrainReport {
            routed,
            failed,
            destinations,
            failures: drain_failures,
            finished_at: Utc::now(),
        };
        self.record(
            LogLevel::Info,
            "bus.drain.completed",
            json!({ "routed": report.routed, "failed": report.failed }),
        );
        report
    }

    fn record(&self, level: LogLevel, event_type: &str, payload: Value) {
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(level, event_type, payload.clone());
            let _ = telemetry.event(event_type, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_engine::Engine;

    fn fleet_with(names: &[&str]) -> EngineFleet {
        let mut fleet = EngineFleet::new();
        for name in names {
            fleet.register(Engine::builder(*name).objective("test").build());
        }
        fleet
    }

    #[test]
    fn drains_by_priority_then_acceptance_order() {
        let bus = MessageBus::new();
        let mut fleet = fleet_with(&["sink"]);
        bus.send_message(RoutingLevel::Domain, "t", "sink", json!({"job_type": "a"}), 5);
        bus.send_message(RoutingLevel::Domain, "t", "sink", json!({"job_type": "b"}), 9);
        bus.send_message(RoutingLevel::Domain, "t", "sink", json!({"job_type": "c"}), 5);
        bus.process(&mut fleet);
        let engine = fleet.get_mut("sink").unwrap();
        let report = engine.run();
        let order: Vec<&str> = report.jobs.iter().map(|j| j.job_type.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn unknown_destination_is_recorded_not_fatal() {
        let bus = MessageBus::new();
        let mut fleet = fleet_with(&["real"]);
        bus.send_message(RoutingLevel::Execution, "t", "ghost", json!({}), 8);
        bus.send_message(RoutingLevel::Execution, "t", "real", json!({}), 5);
        let report = bus.process(&mut fleet);
        assert_eq!(report.routed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].destination, "ghost");
        assert!(report.failures[0].reason.contains("unknown destination"));
        assert_eq!(fleet.get("real").unwrap().queue_depth(), 1);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn missing_job_type_falls_back_to_dispatch() {
        let bus = MessageBus::new();
        let mut fleet = fleet_with(&["sink"]);
        bus.send_message(RoutingLevel::Delivery, "t", "sink", json!({"note": "hi"}), 5);
        bus.process(&mut fleet);
        let report = fleet.get_mut("sink").unwrap().run();
        assert_eq!(report.jobs[0].job_type, DEFAULT_JOB_TYPE);
    }

    #[test]
    fn delivered_messages_are_marked_processed() {
        let bus = MessageBus::new();
        let mut fleet = fleet_with(&["sink"]);
        bus.send_message(RoutingLevel::Feedback, "t", "sink", json!({}), 5);
        bus.process(&mut fleet);
        let recent = bus.recent(10);
        assert_eq!(recent.len(), 1);
        assert!(recent[0].processed);
    }
}
