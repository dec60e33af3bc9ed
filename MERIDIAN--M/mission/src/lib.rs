#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Meridian mission control: missions with explicit KPI targets, the
//! control-plane cycle, organizational health, and escalations.

/// Mission control itself and its cycle reports.
#[path = "../main.rs"]
pub mod control;

/// Read-only executive surfaces.
#[path = "../dashboard.rs"]
pub mod dashboard;

/// Mission records and their lifecycle.
#[path = "../mission.rs"]
pub mod mission;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use control::{
    ActivationReceipt, AssignedTask, ControlCycleReport, ControlThresholds, Escalation,
    EscalationSeverity, MissionControl,
};
pub use dashboard::{ExecutiveDashboard, MissionDigest};
pub use mission::{Mission, MissionError, MissionPriority, MissionStatus};
pub use telemetry::{MissionTelemetry, MissionTelemetryBuilder};
