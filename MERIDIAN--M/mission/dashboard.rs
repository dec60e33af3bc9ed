//! Read-only executive surfaces assembled by mission control.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use meridian_directors::{DirectorReport, KpiSummary};
use shared_logging::LogRecord;

use crate::mission::{Mission, MissionPriority, MissionStatus};

/// One mission condensed to its dashboard row.
#[derive(Debug, Clone, Serialize)]
pub struct MissionDigest {
    /// Mission identifier.
    pub id: Uuid,
    /// Mission title.
    pub title: String,
    /// Urgency tier.
    pub priority: MissionPriority,
    /// Lifecycle state.
    pub status: MissionStatus,
    /// Share of targets met, in `0.0..=100.0`.
    pub progress: f64,
    /// Assigned director names.
    pub directors: Vec<String>,
    /// When the mission is due.
    pub deadline: DateTime<Utc>,
    /// Recorded blocker count.
    pub blockers: usize,
}

impl From<&Mission> for MissionDigest {
    fn from(mission: &Mission) -> Self {
        Self {
            id: mission.id,
            title: mission.title.clone(),
            priority: mission.priority,
            status: mission.status,
            progress: mission.progress,
            directors: mission.directors.clone(),
            deadline: mission.deadline,
            blockers: mission.blockers.len(),
        }
    }
}

/// Read-only aggregate of everything mission control tracks.
///
/// The dashboard is a pure function of current state: without an
/// intervening mutation, two consecutive reads carry the same rows.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutiveDashboard {
    /// Organization-wide health, in `0.0..=100.0`.
    pub health_score: f64,
    /// Headline KPI names below the risk threshold.
    pub at_risk_areas: Vec<String>,
    /// Headline KPI rows in declaration order.
    pub organization: Vec<KpiSummary>,
    /// One report per registered director, in registration order.
    pub directors: Vec<DirectorReport>,
    /// One row per mission, in creation order.
    pub missions: Vec<MissionDigest>,
    /// Escalations raised since construction.
    pub escalations_open: usize,
    /// Most recent control-plane log records, oldest first.
    pub recent_log: Vec<LogRecord>,
    /// When the dashboard was assembled.
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    #[test]
    fn digest_carries_the_mission_row() {
        let mut mission = Mission::new(
            "Audience sprint",
            "grow the list",
            MissionPriority::Routine,
            vec!["marketing".into()],
            indexmap! { "audience_size".to_string() => 25_000.0 },
            14,
        );
        mission.activate().unwrap();
        mission.record_progress(50.0);
        let digest = MissionDigest::from(&mission);
        assert_eq!(digest.id, mission.id);
        assert_eq!(digest.status, MissionStatus::InProgress);
        assert!((digest.progress - 50.0).abs() < f64::EPSILON);
        assert_eq!(digest.directors, vec!["marketing".to_string()]);
        assert_eq!(digest.blockers, 0);
    }
}
