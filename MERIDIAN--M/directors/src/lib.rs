#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Meridian directors: typed KPI registries, remediation playbooks, and
//! per-domain task processing.

/// The director itself and its task runner seam.
#[path = "../main.rs"]
pub mod director;

/// Standing directors for the four business domains.
#[path = "../domains.rs"]
pub mod domains;

/// Typed KPI registry with derived progress and status.
#[path = "../kpi.rs"]
pub mod kpi;

/// Remediation playbooks.
#[path = "../playbook.rs"]
pub mod playbook;

/// Director task records.
#[path = "../task.rs"]
pub mod task;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use director::{Director, DirectorDomain, DirectorError, DirectorReport, TaskRunner};
pub use kpi::{KpiMetric, KpiPeriod, KpiRegistry, KpiSpec, KpiStatus, KpiSummary};
pub use playbook::{ActionTemplate, Playbook, PlaybookDraw, PriorityAction};
pub use task::{DirectorTask, TaskCategory, TaskReport, TaskStatus};
pub use telemetry::{DirectorTelemetry, DirectorTelemetryBuilder};
