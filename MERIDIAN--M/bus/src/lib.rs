#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Meridian message bus: leveled routing into engine queues and the
//! bulkheaded execution cycle that drives the whole fleet.

/// Execution cycle and translator links.
#[path = "../cycle.rs"]
pub mod cycle;

/// Engine registry addressed by the bus.
#[path = "../fleet.rs"]
pub mod fleet;

/// Message records and routing levels.
#[path = "../message.rs"]
pub mod message;

/// The message bus itself.
#[path = "../main.rs"]
pub mod routing;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use cycle::{
    CycleStatus, ExecutionCycle, MessageDraft, Orchestrator, ResultTranslator,
};
pub use fleet::EngineFleet;
pub use message::{BusMessage, RoutingFailure, RoutingLevel};
pub use routing::{BusDrainReport, MessageBus, RoutingError, DEFAULT_JOB_TYPE};
pub use telemetry::{BusTelemetry, BusTelemetryBuilder};
