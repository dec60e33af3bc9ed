//! Mission records and their lifecycle.
//!
//! A mission binds an objective to explicit KPI targets and a set of
//! assigned directors. Progress is measured against those targets and
//! only ever ratchets upward while the mission is live; a later KPI dip
//! never lowers what has already been reported. Terminal states reject
//! further transitions.

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use meridian_directors::DirectorError;

/// Errors surfaced by missions and mission control.
#[derive(Debug, Error)]
pub enum MissionError {
    /// No mission is registered under the id.
    #[error("unknown mission: {0}")]
    UnknownMission(Uuid),
    /// No director is registered under the name.
    #[error("unknown director: {0}")]
    UnknownDirector(String),
    /// The requested lifecycle transition is not allowed.
    #[error("invalid mission transition: {from} -> {to}")]
    InvalidTransition {
        /// State the mission is in.
        from: &'static str,
        /// State that was requested.
        to: &'static str,
    },
    /// A mission needs at least one assigned director.
    #[error("mission has no assigned directors")]
    NoDirectors,
    /// A mission needs at least one KPI target.
    #[error("mission has no KPI targets")]
    EmptyTargets,
    /// A director operation failed underneath mission control.
    #[error(transparent)]
    Director(#[from] DirectorError),
}

/// Urgency tier assigned when a mission is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPriority {
    /// Business as usual.
    Routine,
    /// Needs attention within the period.
    Elevated,
    /// Drop other work for this.
    Critical,
}

impl MissionPriority {
    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Elevated => "elevated",
            Self::Critical => "critical",
        }
    }
}

/// Lifecycle state of a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    /// Created, not yet activated.
    Planned,
    /// Activated, no progress measured yet.
    Active,
    /// Some targets are moving but not all are met.
    InProgress,
    /// Stalled on a recorded blocker.
    Blocked,
    /// Every KPI target was met.
    Completed,
    /// Withdrawn before completion.
    Cancelled,
}

impl MissionStatus {
    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Active => "active",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the state accepts no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether progress is still being measured.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::InProgress)
    }
}

/// A time-boxed objective with explicit KPI targets.
#[derive(Debug, Clone, Serialize)]
pub struct Mission {
    /// Unique identifier.
    pub id: Uuid,
    /// Short title shown on dashboards.
    pub title: String,
    /// What the mission should accomplish.
    pub objective: String,
    /// Urgency tier.
    pub priority: MissionPriority,
    /// Names of the directors assigned to the mission.
    pub directors: Vec<String>,
    /// KPI name to target value, in declaration order.
    pub kpi_targets: IndexMap<String, f64>,
    /// When the mission is due.
    pub deadline: DateTime<Utc>,
    /// Lifecycle state.
    pub status: MissionStatus,
    /// Share of targets met so far, in `0.0..=100.0`; never decreases
    /// while the mission is live.
    pub progress: f64,
    /// Recorded reasons the mission is or was blocked.
    pub blockers: Vec<String>,
    /// Outcome records accumulated over the mission's life.
    pub results: IndexMap<String, Value>,
    /// When the mission was created.
    pub created_at: DateTime<Utc>,
}

impl Mission {
    /// Creates a planned mission due `deadline_days` from now.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        objective: impl Into<String>,
        priority: MissionPriority,
        directors: Vec<String>,
        kpi_targets: IndexMap<String, f64>,
        deadline_days: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            objective: objective.into(),
            priority,
            directors,
            kpi_targets,
            deadline: Utc::now() + Duration::days(deadline_days.max(0)),
            status: MissionStatus::Planned,
            progress: 0.0,
            blockers: Vec::new(),
            results: IndexMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Moves the mission from planned to active.
    ///
    /// # Errors
    ///
    /// Returns [`MissionError::InvalidTransition`] from any other state.
    pub fn activate(&mut self) -> Result<(), MissionError> {
        if self.status == MissionStatus::Planned {
            self.status = MissionStatus::Active;
            Ok(())
        } else {
            Err(self.rejected("active"))
        }
    }

    /// Blocks a live mission with the recorded reason.
    ///
    /// # Errors
    ///
    /// Returns [`MissionError::InvalidTransition`] unless the mission is
    /// live.
    pub fn block(&mut self, reason: impl Into<String>) -> Result<(), MissionError> {
        if self.status.is_live() {
            self.status = MissionStatus::Blocked;
            self.blockers.push(reason.into());
            Ok(())
        } else {
            Err(self.rejected("blocked"))
        }
    }

    /// Returns a blocked mission to measurement.
    ///
    /// # Errors
    ///
    /// Returns [`MissionError::InvalidTransition`] unless the mission is
    /// blocked.
    pub fn unblock(&mut self) -> Result<(), MissionError> {
        if self.status == MissionStatus::Blocked {
            self.status = if self.progress > 0.0 {
                MissionStatus::InProgress
            } else {
                MissionStatus::Active
            };
            Ok(())
        } else {
            Err(self.rejected("active"))
        }
    }

    /// Cancels a mission that has not finished.
    ///
    /// # Errors
    ///
    /// Returns [`MissionError::InvalidTransition`] from terminal states.
    pub fn cancel(&mut self) -> Result<(), MissionError> {
        if self.status.is_terminal() {
            Err(self.rejected("cancelled"))
        } else {
            self.status = MissionStatus::Cancelled;
            Ok(())
        }
    }

    /// Ratchets progress toward the measured share of met targets and
    /// advances the lifecycle. Progress is clamped into `0..=100` and
    /// never lowered; reaching 100 completes the mission exactly once.
    /// Returns whether this call completed the mission. Calls against a
    /// mission that is not live change nothing.
    pub fn record_progress(&mut self, measured: f64) -> bool {
        if !self.status.is_live() {
            return false;
        }
        self.progress = self.progress.max(measured.clamp(0.0, 100.0));
        if self.progress >= 100.0 {
            self.status = MissionStatus::Completed;
            true
        } else {
            if self.progress > 0.0 {
                self.status = MissionStatus::InProgress;
            }
            false
        }
    }

    fn rejected(&self, to: &'static str) -> MissionError {
        MissionError::InvalidTransition {
            from: self.status.label(),
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    fn mission() -> Mission {
        Mission::new(
            "Q3 revenue push",
            "hit the revenue and reach targets",
            MissionPriority::Elevated,
            vec!["commerce".into(), "marketing".into()],
            indexmap! { "revenue".to_string() => 40_000.0 },
            30,
        )
    }

    #[test]
    fn activation_only_from_planned() {
        let mut mission = mission();
        assert_eq!(mission.status, MissionStatus::Planned);
        mission.activate().unwrap();
        assert_eq!(mission.status, MissionStatus::Active);
        let err = mission.activate().unwrap_err();
        assert!(matches!(
            err,
            MissionError::InvalidTransition { from: "active", to: "active" }
        ));
    }

    #[test]
    fn progress_ratchets_and_completes_once() {
        let mut mission = mission();
        mission.activate().unwrap();
        assert!(!mission.record_progress(50.0));
        assert_eq!(mission.status, MissionStatus::InProgress);
        // A dip in measured progress never lowers the reported value.
        assert!(!mission.record_progress(25.0));
        assert!((mission.progress - 50.0).abs() < f64::EPSILON);
        assert!(mission.record_progress(100.0));
        assert_eq!(mission.status, MissionStatus::Completed);
        // Terminal: a further measurement cannot re-complete it.
        assert!(!mission.record_progress(100.0));
    }

    #[test]
    fn progress_is_clamped() {
        let mut mission = mission();
        mission.activate().unwrap();
        assert!(mission.record_progress(250.0));
        assert!((mission.progress - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn blocking_records_the_reason() {
        let mut mission = mission();
        mission.activate().unwrap();
        mission.block("payment gateway outage").unwrap();
        assert_eq!(mission.status, MissionStatus::Blocked);
        assert_eq!(mission.blockers, vec!["payment gateway outage".to_string()]);
        // Blocked missions do not measure progress.
        assert!(!mission.record_progress(80.0));
        assert!((mission.progress - 0.0).abs() < f64::EPSILON);
        mission.unblock().unwrap();
        assert_eq!(mission.status, MissionStatus::Active);
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut mission = mission();
        mission.cancel().unwrap();
        assert!(mission.cancel().is_err());
        assert!(mission.activate().is_err());
        assert!(mission.block("late").is_err());
    }
}
