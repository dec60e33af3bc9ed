//! The director: a KPI-owning domain lead with a task queue and a
//! remediation playbook.
//!
//! Task execution dispatches on the category fixed at task creation.
//! Every task failure is caught individually: the task becomes blocked
//! with the captured error and the pass continues, so one bad task never
//! starves the rest of the queue.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::LogLevel;
use thiserror::Error;
use uuid::Uuid;

use crate::kpi::{KpiMetric, KpiRegistry, KpiSpec, KpiSummary};
use crate::playbook::{Playbook, PriorityAction};
use crate::task::{DirectorTask, TaskReport, TaskStatus};
use crate::telemetry::DirectorTelemetry;

/// Actions included in a director report.
const REPORT_ACTION_LIMIT: usize = 5;

/// Errors surfaced by directors and their registries.
#[derive(Debug, Error)]
pub enum DirectorError {
    /// The KPI name was never declared.
    #[error("unknown KPI: {0}")]
    UnknownKpi(String),
    /// The KPI name is already declared.
    #[error("KPI already declared: {0}")]
    DuplicateKpi(String),
    /// A task runner failed; the task is blocked with this message.
    #[error("task execution failed: {0}")]
    TaskExecution(String),
    /// The director's runner has no branch for the task category.
    #[error("{domain} director does not run {category} tasks")]
    UnsupportedCategory {
        /// Director domain.
        domain: String,
        /// Rejected task category.
        category: String,
    },
}

/// Business domain a director leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectorDomain {
    /// Audience growth and content distribution.
    Marketing,
    /// Revenue, orders, and pricing.
    Commerce,
    /// Fulfilment and delivery reliability.
    Operations,
    /// Member engagement and retention.
    Community,
}

impl DirectorDomain {
    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Marketing => "marketing",
            Self::Commerce => "commerce",
            Self::Operations => "operations",
            Self::Community => "community",
        }
    }
}

/// Executes one task against the director's KPI registry.
pub trait TaskRunner: Send + Sync {
    /// Runs the task, returning its result payload. Runners may move KPIs
    /// to reflect the work done.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectorError`] when the task cannot be completed; the
    /// director blocks the task and continues the pass.
    fn execute(&self, task: &DirectorTask, kpis: &mut KpiRegistry) -> Result<Value, DirectorError>;
}

impl<F> TaskRunner for F
where
    F: Fn(&DirectorTask, &mut KpiRegistry) -> Result<Value, DirectorError> + Send + Sync,
{
    fn execute(&self, task: &DirectorTask, kpis: &mut KpiRegistry) -> Result<Value, DirectorError> {
        self(task, kpis)
    }
}

/// Point-in-time director report for the control plane.
#[derive(Debug, Clone, Serialize)]
pub struct DirectorReport {
    /// Director name.
    pub director: String,
    /// Domain the director leads.
    pub domain: DirectorDomain,
    /// KPI rows in declaration order.
    pub kpis: Vec<KpiSummary>,
    /// KPI names currently at risk or behind.
    pub at_risk: Vec<String>,
    /// Top recommended actions, ascending by priority, at most five.
    pub actions: Vec<PriorityAction>,
    /// Tasks still waiting for a processing pass.
    pub pending_tasks: usize,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

/// A KPI-owning domain lead.
pub struct Director {
    name: String,
    domain: DirectorDomain,
    kpis: KpiRegistry,
    tasks: Vec<DirectorTask>,
    playbook: Playbook,
    runner: Arc<dyn TaskRunner>,
    telemetry: Option<DirectorTelemetry>,
}

impl fmt::Debug for Director {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Director")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("kpis", &self.kpis.len())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl Director {
    /// Creates a director with an empty registry and playbook.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        domain: DirectorDomain,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        Self {
            name: name.into(),
            domain,
            kpis: KpiRegistry::new(),
            tasks: Vec::new(),
            playbook: Playbook::new(),
            runner,
            telemetry: None,
        }
    }

    /// Replaces the playbook.
    #[must_use]
    pub fn with_playbook(mut self, playbook: Playbook) -> Self {
        self.playbook = playbook;
        self
    }

    /// Replaces the whole KPI registry, typically with a fixed schema.
    #[must_use]
    pub fn with_kpis(mut self, kpis: KpiRegistry) -> Self {
        self.kpis = kpis;
        self
    }

    /// Attaches a telemetry handle.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: DirectorTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Director name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Domain the director leads.
    #[must_use]
    pub const fn domain(&self) -> DirectorDomain {
        self.domain
    }

    /// The KPI registry, read-only.
    #[must_use]
    pub const fn kpis(&self) -> &KpiRegistry {
        &self.kpis
    }

    /// Declares a KPI on the registry.
    ///
    /// # Errors
    ///
    /// Returns [`DirectorError::DuplicateKpi`] when the name is taken.
    pub fn declare_kpi(&mut self, spec: KpiSpec) -> Result<(), DirectorError> {
        self.kpis.declare(spec)
    }

    /// Overwrites a KPI's current value.
    ///
    /// # Errors
    ///
    /// Returns [`DirectorError::UnknownKpi`] for undeclared names.
    pub fn record_kpi(&mut self, name: &str, value: f64) -> Result<f64, DirectorError> {
        let new_value = self.kpis.record(name, value)?;
        self.record(
            LogLevel::Debug,
            "director.kpi.recorded",
            json!({ "director": self.name, "kpi": name, "value": new_value }),
        );
        Ok(new_value)
    }

    /// Adds a delta to a KPI's current value.
    ///
    /// # Errors
    ///
    /// Returns [`DirectorError::UnknownKpi`] for undeclared names.
    pub fn increment_kpi(&mut self, name: &str, delta: f64) -> Result<f64, DirectorError> {
        let new_value = self.kpis.increment(name, delta)?;
        self.record(
            LogLevel::Debug,
            "director.kpi.recorded",
            json!({ "director": self.name, "kpi": name, "value": new_value, "delta": delta }),
        );
        Ok(new_value)
    }

    /// Looks up a declared KPI.
    #[must_use]
    pub fn kpi(&self, name: &str) -> Option<&KpiMetric> {
        self.kpis.get(name)
    }

    /// KPI names currently at risk or behind, in declaration order.
    #[must_use]
    pub fn at_risk(&self) -> Vec<String> {
        self.kpis.at_risk()
    }

    /// Recommended actions for the current KPI standing, ascending by
    /// priority. Falls back to the playbook baseline when nothing is at
    /// risk. At-risk names without a recipe are logged per item and
    /// skipped; they never abort the draw.
    #[must_use]
    pub fn priority_actions(&self) -> Vec<PriorityAction> {
        let at_risk = self.kpis.at_risk();
        let draw = self.playbook.draw(&at_risk);
        for kpi in &draw.unmatched {
            self.record(
                LogLevel::Warn,
                "director.playbook.missing",
                json!({ "director": self.name, "kpi": kpi }),
            );
        }
        draw.actions
    }

    /// Queues a task for the next processing pass, returning its id.
    pub fn assign_task(&mut self, task: DirectorTask) -> Uuid {
        let id = task.id;
        self.record(
            LogLevel::Info,
            "director.task.assigned",
            json!({
                "director": self.name,
                "task_id": id,
                "title": task.title,
                "category": task.category.label(),
                "priority": task.priority,
            }),
        );
        self.tasks.push(task);
        id
    }

    /// All tasks ever assigned, in assignment order.
    #[must_use]
    pub fn tasks(&self) -> &[DirectorTask] {
        &self.tasks
    }

    /// Tasks still waiting for a processing pass.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .count()
    }

    /// Executes every pending task in ascending priority order, ties in
    /// assignment order. A failing task is blocked with its captured error
    /// and the pass continues. Returns one report per executed task.
    pub fn process_pending_tasks(&mut self) -> Vec<TaskReport> {
        let mut order: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.status == TaskStatus::Pending)
            .map(|(idx, _)| idx)
            .collect();
        order.sort_by_key(|&idx| self.tasks[idx].priority);

        let mut reports = Vec::with_capacity(order.len());
        for idx in order {
            self.tasks[idx].status = TaskStatus::InProgress;
            let task = self.tasks[idx].clone();
            match self.runner.execute(&task, &mut self.kpis) {
                Ok(result) => {
                    self.tasks[idx].status = TaskStatus::Completed;
                    self.tasks[idx].result = Some(result);
                }
                Err(err) => {
                    self.tasks[idx].status = TaskStatus::Blocked;
                    self.tasks[idx].result = Some(json!({ "error": err.to_string() }));
                }
            }
            let report = TaskReport {
                task_id: task.id,
                title: task.title,
                category: task.category,
                status: self.tasks[idx].status,
                result: self.tasks[idx].result.clone(),
            };
            if let Some(telemetry) = &self.telemetry {
                telemetry.task_outcome(&self.name, &report);
            }
            reports.push(report);
        }
        reports
    }

    /// Point-in-time report: KPI rows, at-risk names, top actions, and the
    /// pending-task count. Never mutates the director.
    #[must_use]
    pub fn report(&self) -> DirectorReport {
        let mut actions = self.priority_actions();
        actions.truncate(REPORT_ACTION_LIMIT);
        DirectorReport {
            director: self.name.clone(),
            domain: self.domain,
            kpis: self.kpis.summaries(),
            at_risk: self.kpis.at_risk(),
            actions,
            pending_tasks: self.pending_count(),
            generated_at: Utc::now(),
        }
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
    use crate::kpi::KpiPeriod;
    use crate::task::TaskCategory;

    fn echo_runner() -> Arc<dyn TaskRunner> {
        Arc::new(|task: &DirectorTask, _: &mut KpiRegistry| {
            Ok(json!({ "completed": task.title }))
        })
    }

    fn director_with(runner: Arc<dyn TaskRunner>) -> Director {
        let mut director = Director::new("marketing", DirectorDomain::Marketing, runner);
        director
            .declare_kpi(KpiSpec::new("audience_size", 1000.0, "subscribers", KpiPeriod::Monthly))
            .unwrap();
        director
    }

    #[test]
    fn failing_task_blocks_and_pass_continues() {
        let runner: Arc<dyn TaskRunner> =
            Arc::new(|task: &DirectorTask, _: &mut KpiRegistry| {
                if task.category == TaskCategory::Pricing {
                    Err(DirectorError::TaskExecution("pricing feed offline".into()))
                } else {
                    Ok(json!({ "completed": task.title }))
                }
            });
        let mut director = director_with(runner);
        director.assign_task(DirectorTask::new("Reprice tees", "sync", TaskCategory::Pricing, 1));
        director.assign_task(DirectorTask::new("Write digest", "draft", TaskCategory::Content, 5));

        let reports = director.process_pending_tasks();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].status, TaskStatus::Blocked);
        let error = reports[0].result.as_ref().unwrap()["error"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(error.contains("pricing feed offline"));
        assert_eq!(reports[1].status, TaskStatus::Completed);
    }

    #[test]
    fn pending_pass_runs_ascending_priority() {
        let mut director = director_with(echo_runner());
        director.assign_task(DirectorTask::new("third", "", TaskCategory::Analysis, 5));
        director.assign_task(DirectorTask::new("first", "", TaskCategory::Analysis, 1));
        director.assign_task(DirectorTask::new("second", "", TaskCategory::Analysis, 3));
        let titles: Vec<String> = director
            .process_pending_tasks()
            .into_iter()
            .map(|report| report.title)
            .collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[test]
    fn completed_tasks_are_not_reprocessed() {
        let mut director = director_with(echo_runner());
        director.assign_task(DirectorTask::new("once", "", TaskCategory::Content, 2));
        assert_eq!(director.process_pending_tasks().len(), 1);
        assert!(director.process_pending_tasks().is_empty());
        assert_eq!(director.pending_count(), 0);
    }

    #[test]
    fn runners_move_kpis() {
        let runner: Arc<dyn TaskRunner> =
            Arc::new(|_: &DirectorTask, kpis: &mut KpiRegistry| {
                let value = kpis.increment("audience_size", 150.0)?;
                Ok(json!({ "audience_size": value }))
            });
        let mut director = director_with(runner);
        director.assign_task(DirectorTask::new("Grow list", "", TaskCategory::Outreach, 2));
        director.process_pending_tasks();
        assert!((director.kpis().current("audience_size").unwrap() - 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn report_reflects_state_without_mutating_it() {
        let mut director = director_with(echo_runner());
        director.record_kpi("audience_size", 400.0).unwrap();
        director.assign_task(DirectorTask::new("later", "", TaskCategory::Outreach, 4));
        let first = director.report();
        let second = director.report();
        assert_eq!(first.kpis, second.kpis);
        assert_eq!(first.at_risk, second.at_risk);
        assert_eq!(first.pending_tasks, second.pending_tasks);
        assert_eq!(first.at_risk, vec!["audience_size".to_string()]);
        assert_eq!(first.pending_tasks, 1);
    }
}
