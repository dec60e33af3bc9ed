//! Mission control: the top layer of the control plane.
//!
//! Mission control owns the registered directors, the missions assigned
//! to them, and an organization-wide registry of four headline KPIs.
//! `execute_cycle()` is one deterministic tick: pull director reports,
//! project their KPI values into the headline registry, recompute health
//! and risk, run every pending director task, re-measure mission
//! progress, and raise escalations. Escalations are advisory records;
//! nothing here enforces anything.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use meridian_directors::{
    Director, DirectorDomain, DirectorReport, DirectorTask, KpiPeriod, KpiRegistry, KpiSpec,
    TaskCategory, TaskReport,
};
use shared_logging::{LogLevel, LogRecord, MemoryLogBuffer};

use crate::dashboard::{ExecutiveDashboard, MissionDigest};
use crate::mission::{Mission, MissionError, MissionPriority, MissionStatus};
use crate::telemetry::MissionTelemetry;

/// Headline KPI schema: name, default target, unit, cadence.
const HEADLINE_KPIS: [(&str, f64, &str, KpiPeriod); 4] = [
    ("revenue", 40_000.0, "usd", KpiPeriod::Monthly),
    ("audience_size", 25_000.0, "subscribers", KpiPeriod::Monthly),
    ("social_reach", 50_000.0, "impressions", KpiPeriod::Weekly),
    ("delivery_success_rate", 98.0, "percent", KpiPeriod::Weekly),
];

/// Fixed mapping from a director domain to the headline KPI it reports.
const PROJECTIONS: [(DirectorDomain, &str); 4] = [
    (DirectorDomain::Commerce, "revenue"),
    (DirectorDomain::Marketing, "audience_size"),
    (DirectorDomain::Marketing, "social_reach"),
    (DirectorDomain::Operations, "delivery_success_rate"),
];

/// Log records surfaced on the executive dashboard.
const RECENT_LOG_LIMIT: usize = 20;

/// Tunable limits applied by mission control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlThresholds {
    /// Health score below which an urgent escalation is raised.
    #[serde(default = "ControlThresholds::default_health_floor")]
    pub health_floor: f64,
    /// Share of target below which a headline KPI counts as at risk.
    #[serde(default = "ControlThresholds::default_risk_ratio")]
    pub risk_ratio: f64,
    /// Priority actions converted into tasks per director on activation.
    #[serde(default = "ControlThresholds::default_actions_per_activation")]
    pub actions_per_activation: usize,
}

impl ControlThresholds {
    const fn default_health_floor() -> f64 {
        50.0
    }

    const fn default_risk_ratio() -> f64 {
        0.5
    }

    const fn default_actions_per_activation() -> usize {
        3
    }
}

impl Default for ControlThresholds {
    fn default() -> Self {
        Self {
            health_floor: Self::default_health_floor(),
            risk_ratio: Self::default_risk_ratio(),
            actions_per_activation: Self::default_actions_per_activation(),
        }
    }
}

/// How loud an escalation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationSeverity {
    /// Worth a look during the period.
    Advisory,
    /// Needs attention now.
    Urgent,
}

impl EscalationSeverity {
    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Advisory => "advisory",
            Self::Urgent => "urgent",
        }
    }
}

/// Advisory record raised when health or a headline KPI crosses a
/// threshold. Never enforced automatically.
#[derive(Debug, Clone, Serialize)]
pub struct Escalation {
    /// Unique identifier.
    pub id: Uuid,
    /// How loud the escalation is.
    pub severity: EscalationSeverity,
    /// Headline area the escalation concerns, or `"organization"`.
    pub area: String,
    /// What crossed the threshold.
    pub message: String,
    /// When the escalation was raised.
    pub raised_at: DateTime<Utc>,
}

impl Escalation {
    fn new(severity: EscalationSeverity, area: impl Into<String>, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            area: area.into(),
            message,
            raised_at: Utc::now(),
        }
    }
}

/// One task created from a priority action during activation.
#[derive(Debug, Clone, Serialize)]
pub struct AssignedTask {
    /// Director the task went to.
    pub director: String,
    /// Identifier of the created task.
    pub task_id: Uuid,
    /// Task title (the recommended action).
    pub title: String,
    /// Dispatch category carried over from the action.
    pub category: TaskCategory,
    /// Urgency carried over from the action.
    pub priority: u8,
}

/// Outcome of activating a mission.
#[derive(Debug, Clone, Serialize)]
pub struct ActivationReceipt {
    /// The activated mission.
    pub mission_id: Uuid,
    /// Lifecycle state after activation.
    pub status: MissionStatus,
    /// Tasks created from the assigned directors' priority actions.
    pub tasks_assigned: Vec<AssignedTask>,
}

/// Outcome of one control-plane tick.
#[derive(Debug, Clone, Serialize)]
pub struct ControlCycleReport {
    /// Tick counter, starting at 1.
    pub cycle: u64,
    /// Organization-wide health measured this tick, in `0.0..=100.0`.
    pub health_score: f64,
    /// Headline KPI names below the risk threshold this tick.
    pub at_risk_areas: Vec<String>,
    /// Director task outcomes produced this tick.
    pub actions_taken: Vec<TaskReport>,
    /// Escalations raised this tick.
    pub escalations: Vec<Escalation>,
    /// Missions that reached 100% progress this tick.
    pub missions_completed: Vec<Uuid>,
    /// When the tick finished.
    pub generated_at: DateTime<Utc>,
}

/// The top layer: missions, directors, organizational health.
pub struct MissionControl {
    directors: IndexMap<String, Director>,
    missions: IndexMap<Uuid, Mission>,
    organization: KpiRegistry,
    health_score: f64,
    escalations: Vec<Escalation>,
    cycle_count: u64,
    thresholds: ControlThresholds,
    telemetry: Option<MissionTelemetry>,
    log_buffer: Option<MemoryLogBuffer>,
}

impl fmt::Debug for MissionControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MissionControl")
            .field("directors", &self.directors.len())
            .field("missions", &self.missions.len())
            .field("cycle_count", &self.cycle_count)
            .field("health_score", &self.health_score)
            .finish_non_exhaustive()
    }
}

impl Default for MissionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionControl {
    /// Creates mission control with default thresholds and headline
    /// targets and no directors.
    #[must_use]
    pub fn new() -> Self {
        Self {
            directors: IndexMap::new(),
            missions: IndexMap::new(),
            organization: Self::headline_registry(&IndexMap::new()),
            health_score: 0.0,
            escalations: Vec::new(),
            cycle_count: 0,
            thresholds: ControlThresholds::default(),
            telemetry: None,
            log_buffer: None,
        }
    }

    /// Replaces the thresholds.
    #[must_use]
    pub const fn with_thresholds(mut self, thresholds: ControlThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Overrides headline KPI targets by name; unknown names are ignored.
    /// Rebuilds the headline registry, so call this before any cycle runs.
    #[must_use]
    pub fn with_headline_targets(mut self, targets: &IndexMap<String, f64>) -> Self {
        self.organization = Self::headline_registry(targets);
        self
    }

    /// Attaches a telemetry handle.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: MissionTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Attaches the in-memory log buffer surfaced on the dashboard.
    #[must_use]
    pub fn with_log_buffer(mut self, buffer: MemoryLogBuffer) -> Self {
        self.log_buffer = Some(buffer);
        self
    }

    fn headline_registry(overrides: &IndexMap<String, f64>) -> KpiRegistry {
        HEADLINE_KPIS
            .iter()
            .map(|(name, target, unit, period)| {
                let target = overrides.get(*name).copied().unwrap_or(*target);
                KpiSpec::new(*name, target, *unit, *period)
            })
            .collect()
    }

    /// Registers a director under its own name, replacing any director
    /// already registered under that name.
    pub fn register_director(&mut self, director: Director) {
        self.record(
            LogLevel::Info,
            "control.director.registered",
            json!({
                "director": director.name(),
                "domain": director.domain().label(),
                "kpis": director.kpis().len(),
            }),
        );
        self.directors
            .insert(director.name().to_string(), director);
    }

    /// Looks up a registered director.
    #[must_use]
    pub fn director(&self, name: &str) -> Option<&Director> {
        self.directors.get(name)
    }

    /// Looks up a registered director for mutation, used by collaborators
    /// feeding external measurements into a domain.
    pub fn director_mut(&mut self, name: &str) -> Option<&mut Director> {
        self.directors.get_mut(name)
    }

    /// Registered director names in registration order.
    #[must_use]
    pub fn director_names(&self) -> Vec<String> {
        self.directors.keys().cloned().collect()
    }

    /// A fresh report from every director, in registration order.
    #[must_use]
    pub fn director_reports(&self) -> Vec<DirectorReport> {
        self.directors.values().map(Director::report).collect()
    }

    /// Missions in creation order.
    pub fn missions(&self) -> impl Iterator<Item = &Mission> {
        self.missions.values()
    }

    /// Looks up a mission by id.
    #[must_use]
    pub fn mission(&self, id: Uuid) -> Option<&Mission> {
        self.missions.get(&id)
    }

    /// Escalations raised since construction, oldest first.
    #[must_use]
    pub fn escalations(&self) -> &[Escalation] {
        &self.escalations
    }

    /// Health measured by the most recent cycle.
    #[must_use]
    pub const fn health_score(&self) -> f64 {
        self.health_score
    }

    /// Number of cycles executed.
    #[must_use]
    pub const fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Thresholds in force.
    #[must_use]
    pub const fn thresholds(&self) -> ControlThresholds {
        self.thresholds
    }

    /// Creates a planned mission and pushes a kickoff coordination task to
    /// every assigned director.
    ///
    /// # Errors
    ///
    /// Returns [`MissionError::NoDirectors`] without assigned directors,
    /// [`MissionError::EmptyTargets`] without KPI targets, and
    /// [`MissionError::UnknownDirector`] when an assignee is not
    /// registered.
    pub fn create_mission(
        &mut self,
        title: impl Into<String>,
        objective: impl Into<String>,
        priority: MissionPriority,
        directors: Vec<String>,
        kpi_targets: IndexMap<String, f64>,
        deadline_days: i64,
    ) -> Result<Uuid, MissionError> {
        if directors.is_empty() {
            return Err(MissionError::NoDirectors);
        }
        if kpi_targets.is_empty() {
            return Err(MissionError::EmptyTargets);
        }
        if let Some(missing) = directors
            .iter()
            .find(|name| !self.directors.contains_key(*name))
        {
            return Err(MissionError::UnknownDirector(missing.clone()));
        }

        let mission = Mission::new(
            title,
            objective,
            priority,
            directors,
            kpi_targets,
            deadline_days,
        );
        let id = mission.id;
        let kpi_names: Vec<String> = mission.kpi_targets.keys().cloned().collect();
        for name in mission.directors.clone() {
            if let Some(director) = self.directors.get_mut(&name) {
                let task = DirectorTask::new(
                    format!("Kick off: {}", mission.title),
                    mission.objective.clone(),
                    TaskCategory::Coordination,
                    1,
                )
                .with_kpis(kpi_names.clone());
                director.assign_task(task);
            }
        }
        self.record(
            LogLevel::Info,
            "mission.created",
            json!({
                "mission_id": id,
                "title": mission.title,
                "priority": mission.priority.label(),
                "directors": mission.directors,
                "targets": kpi_names,
            }),
        );
        self.missions.insert(id, mission);
        Ok(id)
    }

    /// Activates a planned mission and converts each assigned director's
    /// top priority actions into concrete tasks, up to the configured
    /// limit per director.
    ///
    /// # Errors
    ///
    /// Returns [`MissionError::UnknownMission`] for unknown ids and
    /// [`MissionError::InvalidTransition`] unless the mission is planned.
    pub fn activate_mission(&mut self, id: Uuid) -> Result<ActivationReceipt, MissionError> {
        let limit = self.thresholds.actions_per_activation;
        let mission = self
            .missions
            .get_mut(&id)
            .ok_or(MissionError::UnknownMission(id))?;
        mission.activate()?;
        let title = mission.title.clone();
        let status = mission.status;
        let assignees = mission.directors.clone();

        let mut tasks_assigned = Vec::new();
        for name in &assignees {
            let Some(director) = self.directors.get_mut(name) else {
                continue;
            };
            let actions: Vec<_> = director.priority_actions().into_iter().take(limit).collect();
            for action in actions {
                let task = DirectorTask::new(
                    action.action.clone(),
                    format!("{title}: {}", action.target),
                    action.category,
                    action.priority,
                )
                .with_kpis(action.kpi_refs.clone());
                let task_id = director.assign_task(task);
                tasks_assigned.push(AssignedTask {
                    director: name.clone(),
                    task_id,
                    title: action.action,
                    category: action.category,
                    priority: action.priority,
                });
            }
        }
        self.record(
            LogLevel::Info,
            "mission.activated",
            json!({
                "mission_id": id,
                "title": title,
                "tasks_assigned": tasks_assigned.len(),
            }),
        );
        Ok(ActivationReceipt {
            mission_id: id,
            status,
            tasks_assigned,
        })
    }

    /// Blocks a live mission with the recorded reason.
    ///
    /// # Errors
    ///
    /// Returns [`MissionError::UnknownMission`] for unknown ids and
    /// [`MissionError::InvalidTransition`] unless the mission is live.
    pub fn block_mission(&mut self, id: Uuid, reason: impl Into<String>) -> Result<(), MissionError> {
        let reason = reason.into();
        let mission = self
            .missions
            .get_mut(&id)
            .ok_or(MissionError::UnknownMission(id))?;
        mission.block(reason.clone())?;
        self.record(
            LogLevel::Warn,
            "mission.blocked",
            json!({ "mission_id": id, "reason": reason }),
        );
        Ok(())
    }

    /// Cancels a mission that has not finished.
    ///
    /// # Errors
    ///
    /// Returns [`MissionError::UnknownMission`] for unknown ids and
    /// [`MissionError::InvalidTransition`] from terminal states.
    pub fn cancel_mission(&mut self, id: Uuid) -> Result<(), MissionError> {
        let mission = self
            .missions
            .get_mut(&id)
            .ok_or(MissionError::UnknownMission(id))?;
        mission.cancel()?;
        self.record(
            LogLevel::Info,
            "mission.cancelled",
            json!({ "mission_id": id }),
        );
        Ok(())
    }

    /// Records a sale: commerce revenue and order count move immediately,
    /// headline revenue moves with them, and the operations director gets
    /// a fulfilment task so delivery KPIs move when it is processed.
    ///
    /// # Errors
    ///
    /// Returns [`MissionError::UnknownDirector`] when no commerce
    /// director is registered.
    pub fn record_sale(
        &mut self,
        order_id: &str,
        amount: f64,
        channel: &str,
        products: &[String],
    ) -> Result<(), MissionError> {
        let commerce = self
            .directors
            .values_mut()
            .find(|director| director.domain() == DirectorDomain::Commerce)
            .ok_or_else(|| MissionError::UnknownDirector("commerce".into()))?;
        commerce.increment_kpi("revenue", amount)?;
        commerce.increment_kpi("orders", 1.0)?;
        // The next cycle's projection overwrites this with the commerce
        // ledger value; the immediate increment keeps dashboards current
        // between cycles.
        if let Err(err) = self.organization.increment("revenue", amount) {
            self.record(
                LogLevel::Warn,
                "control.projection.failed",
                json!({ "kpi": "revenue", "error": err.to_string() }),
            );
        }
        if let Some(operations) = self
            .directors
            .values_mut()
            .find(|director| director.domain() == DirectorDomain::Operations)
        {
            let task = DirectorTask::new(
                format!("Fulfil order {order_id}"),
                format!("ship {} item(s) sold via {channel}", products.len().max(1)),
                TaskCategory::Fulfilment,
                2,
            )
            .with_kpis(vec![
                "delivery_success_rate".into(),
                "orders_fulfilled".into(),
            ]);
            operations.assign_task(task);
        }
        self.record(
            LogLevel::Info,
            "mission.sale.recorded",
            json!({
                "order_id": order_id,
                "amount": amount,
                "channel": channel,
                "products": products.len(),
            }),
        );
        Ok(())
    }

    /// One control-plane tick, in fixed order: director reports, headline
    /// projection, health and risk measurement, pending-task execution,
    /// mission progress, escalations. Repeated ticks with no external
    /// mutation are idempotent except for task execution, since completed
    /// tasks are no longer pending.
    pub fn execute_cycle(&mut self) -> ControlCycleReport {
        self.cycle_count += 1;
        let reports = self.director_reports();
        self.project_headlines(&reports);
        let (health_score, at_risk_areas) = self.measure_health();
        self.health_score = health_score;

        let mut actions_taken = Vec::new();
        for director in self.directors.values_mut() {
            actions_taken.extend(director.process_pending_tasks());
        }

        let measurements: Vec<(Uuid, f64)> = self
            .missions
            .values()
            .filter(|mission| mission.status.is_live())
            .map(|mission| (mission.id, self.measure_mission(mission)))
            .collect();
        let mut missions_completed = Vec::new();
        for (id, measured) in measurements {
            let cycle = self.cycle_count;
            let Some(mission) = self.missions.get_mut(&id) else {
                continue;
            };
            if mission.record_progress(measured) {
                mission
                    .results
                    .insert("completed_in_cycle".into(), json!(cycle));
                missions_completed.push(id);
            }
        }
        for id in &missions_completed {
            self.record(
                LogLevel::Info,
                "mission.completed",
                json!({ "mission_id": id, "cycle": self.cycle_count }),
            );
        }

        let mut escalations = Vec::new();
        if health_score < self.thresholds.health_floor {
            escalations.push(Escalation::new(
                EscalationSeverity::Urgent,
                "organization",
                format!(
                    "health score {health_score:.1} below floor {:.1}",
                    self.thresholds.health_floor
                ),
            ));
        }
        for area in &at_risk_areas {
            escalations.push(Escalation::new(
                EscalationSeverity::Advisory,
                area.clone(),
                format!(
                    "{area} below {:.0}% of target",
                    self.thresholds.risk_ratio * 100.0
                ),
            ));
        }
        for escalation in &escalations {
            self.record(
                LogLevel::Warn,
                "control.escalation.raised",
                json!({
                    "escalation_id": escalation.id,
                    "severity": escalation.severity.label(),
                    "area": escalation.area,
                    "message": escalation.message,
                }),
            );
        }
        self.escalations.extend(escalations.iter().cloned());

        let report = ControlCycleReport {
            cycle: self.cycle_count,
            health_score,
            at_risk_areas,
            actions_taken,
            escalations,
            missions_completed,
            generated_at: Utc::now(),
        };
        self.record(
            LogLevel::Info,
            "control.cycle.completed",
            json!({
                "cycle": report.cycle,
                "health_score": report.health_score,
                "at_risk_areas": report.at_risk_areas,
                "actions_taken": report.actions_taken.len(),
                "escalations": report.escalations.len(),
                "missions_completed": report.missions_completed.len(),
            }),
        );
        report
    }

    /// Read-only aggregate of everything mission control tracks. Health
    /// and risk are derived fresh from the current headline values, so
    /// two consecutive reads without intervening mutation are equal.
    #[must_use]
    pub fn get_executive_dashboard(&self) -> ExecutiveDashboard {
        let (health_score, at_risk_areas) = self.measure_health();
        ExecutiveDashboard {
            health_score,
            at_risk_areas,
            organization: self.organization.summaries(),
            directors: self.director_reports(),
            missions: self.missions.values().map(MissionDigest::from).collect(),
            escalations_open: self.escalations.len(),
            recent_log: self
                .log_buffer
                .as_ref()
                .map(|buffer| buffer.tail(RECENT_LOG_LIMIT))
                .unwrap_or_default(),
            generated_at: Utc::now(),
        }
    }

    /// Copies each domain's reported headline value into the organization
    /// registry, first registered director per domain wins.
    fn project_headlines(&mut self, reports: &[DirectorReport]) {
        for (domain, kpi) in PROJECTIONS {
            let Some(value) = reports
                .iter()
                .filter(|report| report.domain == domain)
                .find_map(|report| {
                    report
                        .kpis
                        .iter()
                        .find(|summary| summary.name == kpi)
                        .map(|summary| summary.current)
                })
            else {
                continue;
            };
            if let Err(err) = self.organization.record(kpi, value) {
                self.record(
                    LogLevel::Warn,
                    "control.projection.failed",
                    json!({ "kpi": kpi, "error": err.to_string() }),
                );
            }
        }
    }

    /// Health is the unweighted mean of capped headline progress,
    /// skipping any headline whose target is not positive; risk is a
    /// fixed share-of-target threshold per headline.
    fn measure_health(&self) -> (f64, Vec<String>) {
        let mut total = 0.0;
        let mut counted = 0u32;
        let mut at_risk = Vec::new();
        for summary in self.organization.summaries() {
            if summary.target <= 0.0 {
                continue;
            }
            total += summary.progress.min(100.0);
            counted += 1;
            if summary.current < self.thresholds.risk_ratio * summary.target {
                at_risk.push(summary.name);
            }
        }
        let health = if counted == 0 {
            0.0
        } else {
            total / f64::from(counted)
        };
        (health, at_risk)
    }

    /// Share of a mission's targets currently met, in `0.0..=100.0`. A
    /// target is met when any assigned director tracks a same-named KPI
    /// at or above the target; every assignee is scanned, so two
    /// directors may track the same name without shadowing each other.
    #[allow(clippy::cast_precision_loss)]
    fn measure_mission(&self, mission: &Mission) -> f64 {
        if mission.kpi_targets.is_empty() {
            return 0.0;
        }
        let met = mission
            .kpi_targets
            .iter()
            .filter(|(name, target)| {
                mission
                    .directors
                    .iter()
                    .filter_map(|assignee| self.directors.get(assignee))
                    .any(|director| {
                        director
                            .kpis()
                            .current(name)
                            .is_some_and(|current| current >= **target)
                    })
            })
            .count();
        met as f64 / mission.kpi_targets.len() as f64 * 100.0
    }

    fn record(&self, level: LogLevel, event_type: &str, payload: Value) {
        if let Some(buffer) = &self.log_buffer {
            let mut record = LogRecord::new("mission-control", level, event_type);
            if let Some(obj) = payload.as_object() {
                record.fields = obj.clone();
            }
            buffer.push(record);
        }
        if let Some(telemetry) = &self.telemetry {
            telemetry.emit(level, event_type, payload);
        }
    }
}
