//! Interactive control plane: wires the engines, the bus, the directors,
//! and mission control into one operator REPL.

use std::{
    env, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use meridian_bus::{
    BusTelemetry, MessageBus, MessageDraft, Orchestrator, ResultTranslator, RoutingLevel,
};
use meridian_directors::{domains, DirectorDomain, DirectorTelemetry};
use meridian_engine::{Engine, EngineTelemetry, Job, RetryPolicy};
use meridian_mission::{ControlThresholds, MissionControl, MissionPriority, MissionTelemetry};
use serde::Deserialize;
use serde_json::{json, Value};
use shared_event_bus::MemoryEventBus;
use shared_logging::MemoryLogBuffer;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

const DEFAULT_CONFIG_PATH: &str = "control_plane.toml";

/// Runtime configuration, loaded from TOML with per-field defaults.
#[derive(Debug, Clone, Deserialize)]
struct ControlPlaneConfig {
    #[serde(default = "default_log_dir")]
    log_dir: PathBuf,
    #[serde(default = "default_event_capacity")]
    event_capacity: usize,
    #[serde(default = "default_log_retention")]
    log_retention: usize,
    #[serde(default)]
    retry: RetryPolicy,
    #[serde(default)]
    thresholds: ControlThresholds,
    /// KPI targets attached to missions created from the REPL.
    #[serde(default = "default_mission_targets")]
    mission_targets: IndexMap<String, f64>,
    #[serde(default = "default_deadline_days")]
    mission_deadline_days: i64,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs/control_plane")
}

const fn default_event_capacity() -> usize {
    256
}

const fn default_log_retention() -> usize {
    256
}

fn default_mission_targets() -> IndexMap<String, f64> {
    let mut targets = IndexMap::new();
    targets.insert("revenue".to_string(), 40_000.0);
    targets.insert("audience_size".to_string(), 25_000.0);
    targets
}

const fn default_deadline_days() -> i64 {
    30
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            event_capacity: default_event_capacity(),
            log_retention: default_log_retention(),
            retry: RetryPolicy::default(),
            thresholds: ControlThresholds::default(),
            mission_targets: default_mission_targets(),
            mission_deadline_days: default_deadline_days(),
        }
    }
}

impl ControlPlaneConfig {
    /// Loads configuration, falling back to defaults when the file is
    /// absent. A present-but-invalid file is an error, never a silent
    /// fallback.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            bail!("event_capacity must be at least 1");
        }
        if self.retry.max_attempts == 0 || self.retry.max_drain == 0 {
            bail!("retry limits must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.thresholds.risk_ratio) {
            bail!("thresholds.risk_ratio must be within 0..=1");
        }
        if !(0.0..=100.0).contains(&self.thresholds.health_floor) {
            bail!("thresholds.health_floor must be within 0..=100");
        }
        if self.mission_targets.is_empty() {
            bail!("mission_targets must declare at least one KPI");
        }
        if self.mission_deadline_days <= 0 {
            bail!("mission_deadline_days must be positive");
        }
        Ok(())
    }
}

/// The domain engine that executes work for a director's domain. The
/// community director has no engine; its work stays task-only.
const fn engine_for_domain(domain: DirectorDomain) -> Option<&'static str> {
    match domain {
        DirectorDomain::Marketing => Some("marketing"),
        DirectorDomain::Commerce => Some("commerce"),
        DirectorDomain::Operations => Some("operations"),
        DirectorDomain::Community => None,
    }
}

fn coordinator_engine(policy: RetryPolicy, telemetry: EngineTelemetry) -> Engine {
    Engine::builder("coordinator")
        .objective("translate director priorities into engine work")
        .policy(policy)
        .telemetry(telemetry)
        .handler(Arc::new(|job: &Job| match job.job_type.as_str() {
            "assignment.delegate" => Ok(json!({
                "delegated": job.payload.get("action").cloned().unwrap_or_default(),
                "engine": job.payload.get("engine").cloned().unwrap_or_default(),
            })),
            "feedback.revenue" => Ok(json!({
                "acknowledged": job.payload.get("revenue").cloned().unwrap_or_default(),
            })),
            other => Ok(json!({ "acknowledged": other })),
        }))
        .build()
}

fn marketing_engine(policy: RetryPolicy, telemetry: EngineTelemetry) -> Engine {
    Engine::builder("marketing")
        .objective("run campaigns and content distribution")
        .policy(policy)
        .telemetry(telemetry)
        .handler(Arc::new(|job: &Job| match job.job_type.as_str() {
            "marketing.execute" => Ok(json!({
                "executed": job.payload.get("action").cloned().unwrap_or_default(),
                "impressions": 2_500.0,
            })),
            other => Ok(json!({ "acknowledged": other })),
        }))
        .build()
}

fn commerce_engine(policy: RetryPolicy, telemetry: EngineTelemetry) -> Engine {
    Engine::builder("commerce")
        .objective("process storefront orders and offers")
        .policy(policy)
        .telemetry(telemetry)
        .handler(Arc::new(|job: &Job| match job.job_type.as_str() {
            "commerce.execute" => Ok(json!({
                "executed": job.payload.get("action").cloned().unwrap_or_default(),
                "revenue": 450.0,
            })),
            "commerce.sale" => Ok(json!({
                "order_id": job.payload.get("order_id").cloned().unwrap_or_default(),
                "revenue": job.payload.get("amount").and_then(Value::as_f64).unwrap_or(0.0),
            })),
            other => Ok(json!({ "acknowledged": other })),
        }))
        .build()
}

fn operations_engine(policy: RetryPolicy, telemetry: EngineTelemetry) -> Engine {
    Engine::builder("operations")
        .objective("move orders through fulfilment")
        .policy(policy)
        .telemetry(telemetry)
        .handler(Arc::new(|job: &Job| match job.job_type.as_str() {
            "operations.execute" => Ok(json!({
                "executed": job.payload.get("action").cloned().unwrap_or_default(),
                "deliveries": 25,
            })),
            other => Ok(json!({ "acknowledged": other })),
        }))
        .build()
}

/// Delegated assignments completed by the coordinator become execution
/// messages for the named domain engine.
fn delegate_translator() -> ResultTranslator {
    Arc::new(|job: &Job| {
        if job.job_type != "assignment.delegate" {
            return None;
        }
        let engine = job.payload.get("engine").and_then(Value::as_str)?.to_string();
        Some(MessageDraft::new(
            RoutingLevel::Execution,
            engine.clone(),
            json!({
                "job_type": format!("{engine}.execute"),
                "action": job.payload.get("action").cloned().unwrap_or_default(),
                "kpis": job.payload.get("kpis").cloned().unwrap_or_default(),
            }),
            job.priority,
        ))
    })
}

/// Commerce results carrying revenue flow back to the coordinator as
/// feedback messages.
fn revenue_translator() -> ResultTranslator {
    Arc::new(|job: &Job| {
        let revenue = job
            .result
            .as_ref()
            .and_then(|result| result.get("revenue"))
            .and_then(Value::as_f64)
            .filter(|revenue| *revenue > 0.0)?;
        Some(MessageDraft::new(
            RoutingLevel::Feedback,
            "coordinator",
            json!({
                "job_type": "feedback.revenue",
                "revenue": revenue,
                "origin": job.job_type,
            }),
            4,
        ))
    })
}

struct ControlPlane {
    config: ControlPlaneConfig,
    control: MissionControl,
    orchestrator: Orchestrator,
    mission_index: Vec<Uuid>,
}

impl ControlPlane {
    fn bootstrap(config: ControlPlaneConfig) -> Result<Self> {
        fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("creating log dir {}", config.log_dir.display()))?;
        let events = Arc::new(MemoryEventBus::new(config.event_capacity));
        let log_buffer = MemoryLogBuffer::new(config.log_retention);

        let engine_telemetry = EngineTelemetry::builder("engines")
            .log_path(config.log_dir.join("engines.log.jsonl"))
            .event_publisher(events.clone())
            .build()
            .context("building engine telemetry")?;
        let bus_telemetry = BusTelemetry::builder("bus")
            .log_path(config.log_dir.join("bus.log.jsonl"))
            .event_publisher(events.clone())
            .build()
            .context("building bus telemetry")?;
        let director_telemetry = DirectorTelemetry::builder("directors")
            .log_path(config.log_dir.join("directors.log.jsonl"))
            .event_publisher(events.clone())
            .build()
            .context("building director telemetry")?;
        let mission_telemetry = MissionTelemetry::builder("mission-control")
            .log_path(config.log_dir.join("mission.log.jsonl"))
            .event_publisher(events)
            .build()
            .context("building mission telemetry")?;

        let mut control = MissionControl::new()
            .with_thresholds(config.thresholds)
            .with_headline_targets(&config.mission_targets)
            .with_telemetry(mission_telemetry)
            .with_log_buffer(log_buffer);
        for director in domains::standing_directors() {
            control.register_director(director.with_telemetry(director_telemetry.clone()));
        }

        let bus = MessageBus::new().with_telemetry(bus_telemetry.clone());
        let coordinator = coordinator_engine(config.retry, engine_telemetry.clone());
        let mut orchestrator = Orchestrator::new(coordinator, bus).with_telemetry(bus_telemetry);
        orchestrator.register_engine(marketing_engine(config.retry, engine_telemetry.clone()));
        orchestrator.register_engine(commerce_engine(config.retry, engine_telemetry.clone()));
        orchestrator.register_engine(operations_engine(config.retry, engine_telemetry));
        orchestrator
            .connect("coordinator", delegate_translator())
            .context("linking coordinator to the bus")?;
        orchestrator
            .connect("commerce", revenue_translator())
            .context("linking commerce feedback")?;

        Ok(Self {
            config,
            control,
            orchestrator,
            mission_index: Vec::new(),
        })
    }

    async fn run(&mut self) -> Result<()> {
        println!("Meridian control plane ready. Type 'help' for options.");
        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin).lines();
        loop {
            print!("meridian> ");
            io::stdout().flush()?;
            let line = match reader.next_line().await? {
                Some(line) => line.trim().to_string(),
                None => break,
            };
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, ' ');
            let command = parts.next().unwrap_or("");
            let args = parts.next().unwrap_or("").trim();
            match command {
                "mission" => self.handle_mission(args),
                "activate" => self.handle_activate(args),
                "cycle" => self.handle_cycle(),
                "sale" => self.handle_sale(args),
                "status" => self.handle_status(),
                "dashboard" => self.handle_dashboard(),
                "directors" => self.handle_directors(),
                "actions" => self.handle_actions(args),
                "help" => Self::print_help(),
                "exit" | "quit" => break,
                other => println!("Unknown command: {other}. Type 'help' for usage."),
            }
        }
        Ok(())
    }

    fn print_help() {
        println!(
            "Commands:
  mission <title>     - Create a mission across every director
  activate <n>        - Activate mission n (from 'mission' output)
  cycle               - Run one engine cycle and one control-plane tick
  sale <amount> [ch]  - Record a sale through the given channel
  status              - Engine, bus, and mission-control state
  dashboard           - Executive dashboard
  directors           - Per-director KPI reports
  actions <director>  - A director's current priority actions
  help                - Show this message
  exit                - Quit"
        );
    }

    fn handle_mission(&mut self, args: &str) {
        let title = if args.is_empty() {
            "Quarterly operations push"
        } else {
            args
        };
        let result = self.control.create_mission(
            title,
            "meet every configured KPI target",
            MissionPriority::Elevated,
            self.control.director_names(),
            self.config.mission_targets.clone(),
            self.config.mission_deadline_days,
        );
        match result {
            Ok(id) => {
                self.mission_index.push(id);
                println!(
                    "Mission #{} created: {title} ({} target(s), due in {} days)",
                    self.mission_index.len(),
                    self.config.mission_targets.len(),
                    self.config.mission_deadline_days,
                );
            }
            Err(err) => println!("Could not create mission: {err}"),
        }
    }

    fn handle_activate(&mut self, args: &str) {
        let Some(id) = args
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| self.mission_index.get(idx).copied())
        else {
            println!("Usage: activate <n>  (n from 'mission' output)");
            return;
        };
        match self.control.activate_mission(id) {
            Ok(receipt) => {
                println!(
                    "Mission activated ({} task(s) assigned):",
                    receipt.tasks_assigned.len()
                );
                for task in &receipt.tasks_assigned {
                    println!(
                        "  [{}] p{} {} -> {}",
                        task.category.label(),
                        task.priority,
                        task.title,
                        task.director
                    );
                }
            }
            Err(err) => println!("Could not activate mission: {err}"),
        }
    }

    fn handle_cycle(&mut self) {
        // Seed the coordinator from each director's top remediation
        // action. Director actions rank 1 as most urgent while engine
        // queues rank 10 highest, so the priority is inverted.
        let reports = self.control.director_reports();
        for report in &reports {
            let Some(action) = report.actions.first() else {
                continue;
            };
            let Some(engine) = engine_for_domain(report.domain) else {
                continue;
            };
            self.orchestrator.coordinator_mut().enqueue(
                "assignment.delegate",
                json!({
                    "director": report.director,
                    "engine": engine,
                    "action": action.action,
                    "kpis": action.kpi_refs,
                }),
                11 - action.priority.clamp(1, 10),
            );
        }

        let cycle = self.orchestrator.run_cycle();
        println!(
            "Engine cycle #{}: {} | jobs {} (ok {}, failed {}) | routed {} (failed {}) | revenue {:.2}",
            cycle.sequence,
            cycle.status.label(),
            cycle.jobs_processed,
            cycle.jobs_succeeded,
            cycle.jobs_failed,
            cycle.messages_routed,
            cycle.routing_failures,
            cycle.revenue,
        );
        if let Some(err) = &cycle.error {
            println!("  degraded: {err}");
        }

        let report = self.control.execute_cycle();
        println!(
            "Control tick #{}: health {:.1} | at risk {:?} | {} task(s) run | {} escalation(s) | {} mission(s) completed",
            report.cycle,
            report.health_score,
            report.at_risk_areas,
            report.actions_taken.len(),
            report.escalations.len(),
            report.missions_completed.len(),
        );
        for escalation in &report.escalations {
            println!(
                "  [{}] {}: {}",
                escalation.severity.label(),
                escalation.area,
                escalation.message
            );
        }
    }

    fn handle_sale(&mut self, args: &str) {
        let mut parts = args.split_whitespace();
        let Some(amount) = parts.next().and_then(|raw| raw.parse::<f64>().ok()) else {
            println!("Usage: sale <amount> [channel]");
            return;
        };
        let channel = parts.next().unwrap_or("storefront").to_string();
        let order_id = format!("ord-{}", &Uuid::new_v4().simple().to_string()[..8]);
        match self
            .control
            .record_sale(&order_id, amount, &channel, &[])
        {
            Ok(()) => {
                // The sale also travels the bus so the commerce engine
                // books it on the next cycle.
                self.orchestrator.bus().send_message(
                    RoutingLevel::Delivery,
                    "repl",
                    "commerce",
                    json!({
                        "job_type": "commerce.sale",
                        "order_id": order_id,
                        "amount": amount,
                        "channel": channel,
                    }),
                    8,
                );
                println!("Sale {order_id} recorded: {amount:.2} via {channel}");
            }
            Err(err) => println!("Could not record sale: {err}"),
        }
    }

    fn handle_status(&self) {
        println!("Engines:");
        for snapshot in self.orchestrator.snapshots() {
            println!(
                "  {:<12} {:<9} queue {:<3} processed {:<5} ok {:<5} failed {:<4} success {:.1}%",
                snapshot.name,
                snapshot.status.label(),
                snapshot.queue_depth,
                snapshot.metrics.processed,
                snapshot.metrics.succeeded,
                snapshot.metrics.failed,
                snapshot.success_rate,
            );
        }
        println!("Bus: {} message(s) pending", self.orchestrator.bus().pending());
        println!(
            "Mission control: {} cycle(s), health {:.1}, {} mission(s), {} escalation(s)",
            self.control.cycle_count(),
            self.control.health_score(),
            self.control.missions().count(),
            self.control.escalations().len(),
        );
    }

    fn handle_dashboard(&self) {
        let dashboard = self.control.get_executive_dashboard();
        println!(
            "Health {:.1} | at risk {:?} | {} open escalation(s)",
            dashboard.health_score, dashboard.at_risk_areas, dashboard.escalations_open
        );
        println!("Headline KPIs:");
        for kpi in &dashboard.organization {
            println!(
                "  {:<22} {:>12.1} / {:<12.1} {:>6.1}%  {}",
                kpi.name,
                kpi.current,
                kpi.target,
                kpi.progress,
                kpi.status.label()
            );
        }
        if dashboard.missions.is_empty() {
            println!("No missions.");
        } else {
            println!("Missions:");
            for mission in &dashboard.missions {
                println!(
                    "  [{:<11}] {:>5.1}%  {} ({})",
                    mission.status.label(),
                    mission.progress,
                    mission.title,
                    mission.priority.label()
                );
            }
        }
        if !dashboard.recent_log.is_empty() {
            println!("Recent activity:");
            for record in dashboard.recent_log.iter().rev().take(5) {
                println!("  {} {}", record.timestamp.format("%H:%M:%S"), record.message);
            }
        }
    }

    fn handle_directors(&self) {
        for report in self.control.director_reports() {
            println!(
                "{} ({}) - {} pending task(s), at risk {:?}",
                report.director,
                report.domain.label(),
                report.pending_tasks,
                report.at_risk
            );
            for kpi in &report.kpis {
                println!(
                    "  {:<22} {:>12.1} / {:<12.1} {:>6.1}%  {}",
                    kpi.name,
                    kpi.current,
                    kpi.target,
                    kpi.progress,
                    kpi.status.label()
                );
            }
        }
    }

    fn handle_actions(&self, args: &str) {
        if args.is_empty() {
            println!("Usage: actions <director>");
            return;
        }
        match self.control.director(args) {
            Some(director) => {
                let actions = director.priority_actions();
                if actions.is_empty() {
                    println!("No recommended actions for {args}.");
                }
                for action in actions {
                    println!(
                        "  p{} [{}] {} (targets {:?}{})",
                        action.priority,
                        action.category.label(),
                        action.action,
                        action.kpi_refs,
                        action
                            .expected_impact
                            .as_deref()
                            .map(|impact| format!(", expect {impact}"))
                            .unwrap_or_default(),
                    );
                }
            }
            None => println!("Unknown director: {args}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = ControlPlaneConfig::load(&config_path)
        .with_context(|| format!("loading control-plane config from {config_path}"))?;
    let mut plane = ControlPlane::bootstrap(config).context("bootstrapping control plane")?;
    plane.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = ControlPlaneConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert!((config.thresholds.health_floor - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.mission_targets.len(), 2);
    }

    #[test]
    fn partial_config_keeps_field_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("control_plane.toml");
        fs::write(
            &path,
            "[retry]\nmax_attempts = 5\n\n[thresholds]\nhealth_floor = 60.0\n",
        )
        .unwrap();
        let config = ControlPlaneConfig::load(&path).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_drain, 10_000);
        assert!((config.thresholds.health_floor - 60.0).abs() < f64::EPSILON);
        assert!((config.thresholds.risk_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("control_plane.toml");
        fs::write(&path, "[thresholds]\nrisk_ratio = 1.5\n").unwrap();
        assert!(ControlPlaneConfig::load(&path).is_err());
    }

    #[test]
    fn community_work_stays_task_only() {
        assert_eq!(engine_for_domain(DirectorDomain::Marketing), Some("marketing"));
        assert_eq!(engine_for_domain(DirectorDomain::Community), None);
    }

    #[tokio::test]
    async fn bootstrap_wires_a_working_cycle() {
        let dir = tempdir().unwrap();
        let config = ControlPlaneConfig {
            log_dir: dir.path().join("logs"),
            ..ControlPlaneConfig::default()
        };
        let mut plane = ControlPlane::bootstrap(config).unwrap();
        plane.handle_mission("Smoke test mission");
        plane.handle_activate("1");
        plane.handle_cycle();
        assert_eq!(plane.control.cycle_count(), 1);
        assert_eq!(plane.orchestrator.last_cycle().map(|c| c.sequence), Some(1));
        // The seeded coordinator assignments were delegated and executed.
        let snapshots = plane.orchestrator.snapshots();
        let coordinator = &snapshots[0];
        assert!(coordinator.metrics.processed > 0);
    }
}
