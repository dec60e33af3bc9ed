//! Task records assigned to directors.
//!
//! Unlike engine jobs, director tasks rank `1` as most urgent; pending
//! passes execute in ascending priority order. The category is fixed at
//! creation and drives runner dispatch, so execution never re-parses the
//! title.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Dispatch category assigned when a task is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Launch or adjust a promotional campaign.
    Campaign,
    /// Produce a content asset.
    Content,
    /// Review or change pricing.
    Pricing,
    /// Move orders through fulfilment.
    Fulfilment,
    /// Reach prospects or members directly.
    Outreach,
    /// Study KPIs and produce findings.
    Analysis,
    /// Align work across directors.
    Coordination,
}

impl TaskCategory {
    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Campaign => "campaign",
            Self::Content => "content",
            Self::Pricing => "pricing",
            Self::Fulfilment => "fulfilment",
            Self::Outreach => "outreach",
            Self::Analysis => "analysis",
            Self::Coordination => "coordination",
        }
    }
}

/// Lifecycle state of a director task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for the next processing pass.
    Pending,
    /// Currently executing.
    InProgress,
    /// Runner returned a result.
    Completed,
    /// Runner failed; the error is captured on the task.
    Blocked,
}

impl TaskStatus {
    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }
}

/// A unit of director work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorTask {
    /// Unique identifier.
    pub id: Uuid,
    /// Short title shown on dashboards.
    pub title: String,
    /// What the task should accomplish.
    pub description: String,
    /// Dispatch category fixed at creation.
    pub category: TaskCategory,
    /// Urgency in `1..=10`; 1 executes first.
    pub priority: u8,
    /// KPI names the task is expected to move.
    pub kpi_refs: Vec<String>,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Runner result, or `{"error": ...}` when blocked.
    pub result: Option<Value>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
}

impl DirectorTask {
    /// Creates a pending task with a clamped priority.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: TaskCategory,
        priority: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            category,
            priority: priority.clamp(1, 10),
            kpi_refs: Vec::new(),
            status: TaskStatus::Pending,
            result: None,
            created_at: Utc::now(),
        }
    }

    /// Declares the KPIs the task is expected to move.
    #[must_use]
    pub fn with_kpis(mut self, kpi_refs: Vec<String>) -> Self {
        self.kpi_refs = kpi_refs;
        self
    }
}

/// Outcome of one task within a processing pass.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    /// Task identifier.
    pub task_id: Uuid,
    /// Task title.
    pub title: String,
    /// Dispatch category.
    pub category: TaskCategory,
    /// Terminal state the task reached in this pass.
    pub status: TaskStatus,
    /// Runner result, or the captured error for blocked tasks.
    pub result: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tasks_are_pending_with_clamped_priority() {
        let task = DirectorTask::new("Ship weekly digest", "write and send", TaskCategory::Content, 0);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, 1);
        assert!(task.result.is_none());
    }

    #[test]
    fn kpi_refs_attach_fluently() {
        let task = DirectorTask::new("Promo", "run promo", TaskCategory::Campaign, 2)
            .with_kpis(vec!["social_reach".into()]);
        assert_eq!(task.kpi_refs, vec!["social_reach".to_string()]);
    }
}
