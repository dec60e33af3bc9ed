//! Message records routed between engines.

use chrono::{DateTime, Utc};
use meridian_engine::clamp_priority;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Routing tier a message travels on. Levels describe intent, not urgency;
/// urgency is the message priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingLevel {
    /// Orchestration directives between coordinators.
    Control,
    /// Hand-offs between business domains.
    Domain,
    /// Work orders for a specific engine.
    Execution,
    /// Outbound artifacts ready for delivery.
    Delivery,
    /// Results and measurements flowing back upstream.
    Feedback,
}

impl RoutingLevel {
    /// All routing tiers in canonical order.
    pub const ALL: [Self; 5] = [
        Self::Control,
        Self::Domain,
        Self::Execution,
        Self::Delivery,
        Self::Feedback,
    ];

    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Domain => "domain",
            Self::Execution => "execution",
            Self::Delivery => "delivery",
            Self::Feedback => "feedback",
        }
    }
}

/// A routed message owned by the bus until it is drained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    /// Unique message identifier.
    pub id: Uuid,
    /// Routing tier.
    pub level: RoutingLevel,
    /// Component that sent the message.
    pub source: String,
    /// Engine name the message is addressed to.
    pub destination: String,
    /// Payload forwarded to the destination engine; a `job_type` string
    /// field selects the handler branch.
    pub payload: Value,
    /// Urgency in `1..=10`; higher drains first.
    pub priority: u8,
    /// Set once the bus has routed the message.
    pub processed: bool,
    /// Token correlating the message with downstream jobs and logs.
    pub correlation_id: String,
    /// When the message was accepted by the bus.
    pub created_at: DateTime<Utc>,
    /// Acceptance order; ties within a priority drain oldest first.
    #[serde(default)]
    pub(crate) seq: u64,
}

impl BusMessage {
    /// Creates an unprocessed message with a clamped priority and a fresh
    /// correlation token.
    #[must_use]
    pub fn new(
        level: RoutingLevel,
        source: impl Into<String>,
        destination: impl Into<String>,
        payload: Value,
        priority: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            source: source.into(),
            destination: destination.into(),
            payload,
            priority: clamp_priority(priority),
            processed: false,
            correlation_id: Self::generate_correlation_id(),
            created_at: Utc::now(),
            seq: 0,
        }
    }

    fn generate_correlation_id() -> String {
        thread_rng()
            .sample_iter(Alphanumeric)
            .take(16)
            .map(char::from)
            .collect()
    }
}

/// Record of a message the bus could not deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingFailure {
    /// Message that failed to route.
    pub message_id: Uuid,
    /// Destination that could not be resolved.
    pub destination: String,
    /// Why routing failed.
    pub reason: String,
    /// When the failure was recorded.
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_priority_is_clamped() {
        let msg = BusMessage::new(RoutingLevel::Domain, "a", "b", json!({}), 99);
        assert_eq!(msg.priority, 10);
        assert!(!msg.processed);
    }

    #[test]
    fn correlation_ids_are_distinct_tokens() {
        let first = BusMessage::new(RoutingLevel::Control, "a", "b", json!({}), 5);
        let second = BusMessage::new(RoutingLevel::Control, "a", "b", json!({}), 5);
        assert_eq!(first.correlation_id.len(), 16);
        assert_ne!(first.correlation_id, second.correlation_id);
    }

    #[test]
    fn levels_have_stable_labels() {
        let labels: Vec<&str> = RoutingLevel::ALL.iter().map(|l| l.label()).collect();
        assert_eq!(
            labels,
            vec!["control", "domain", "execution", "delivery", "feedback"]
        );
    }
}
