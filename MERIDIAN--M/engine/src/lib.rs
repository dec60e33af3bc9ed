#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Meridian job engine: prioritized queues, bounded retry, drain-to-empty runs.

/// Engine control loop and builder.
#[path = "../main.rs"]
pub mod engine;

/// Job records and admission tickets.
#[path = "../job.rs"]
pub mod job;

/// Rolled-up processing counters.
#[path = "../metrics.rs"]
pub mod metrics;

/// FIFO-within-priority queue.
#[path = "../queue.rs"]
pub mod queue;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use engine::{
    Engine, EngineBuilder, EngineError, EngineReport, EngineSnapshot, EngineStatus, JobHandler,
    ReportSubscriber, RetryPolicy,
};
pub use job::{clamp_priority, Job, JobId, JobStatus, JobTicket, PRIORITY_MAX, PRIORITY_MIN};
pub use metrics::EngineMetrics;
pub use queue::JobQueue;
pub use telemetry::{EngineTelemetry, EngineTelemetryBuilder};
