//! Remediation playbooks: fixed per-director lookup tables mapping an
//! at-risk KPI to a concrete next action.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::task::TaskCategory;

/// A remediation recipe declared ahead of time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTemplate {
    /// What to do.
    pub action: String,
    /// What the action is aimed at, in operator terms.
    pub target: String,
    /// Urgency in `1..=10`; 1 is most urgent.
    pub priority: u8,
    /// Task category the action becomes when converted into work.
    pub category: TaskCategory,
    /// Expected effect, when the recipe declares one.
    pub expected_impact: Option<String>,
}

impl ActionTemplate {
    /// Creates a template.
    #[must_use]
    pub fn new(
        action: impl Into<String>,
        target: impl Into<String>,
        priority: u8,
        category: TaskCategory,
    ) -> Self {
        Self {
            action: action.into(),
            target: target.into(),
            priority: priority.clamp(1, 10),
            category,
            expected_impact: None,
        }
    }

    /// Declares the expected effect.
    #[must_use]
    pub fn with_impact(mut self, impact: impl Into<String>) -> Self {
        self.expected_impact = Some(impact.into());
        self
    }
}

/// A concrete recommended action produced for the current KPI standing.
#[derive(Debug, Clone, Serialize)]
pub struct PriorityAction {
    /// What to do.
    pub action: String,
    /// What the action is aimed at.
    pub target: String,
    /// Urgency in `1..=10`; 1 is most urgent.
    pub priority: u8,
    /// Task category the action becomes when assigned.
    pub category: TaskCategory,
    /// KPI names the action is expected to move.
    pub kpi_refs: Vec<String>,
    /// Expected effect, when the recipe declares one.
    pub expected_impact: Option<String>,
}

/// Result of consulting a playbook: the actions to take plus the at-risk
/// names the playbook had no recipe for.
#[derive(Debug, Clone, Default)]
pub struct PlaybookDraw {
    /// Recommended actions, sorted ascending by priority.
    pub actions: Vec<PriorityAction>,
    /// At-risk KPI names without a recipe, recorded but never fatal.
    pub unmatched: Vec<String>,
}

/// Fixed remediation table for one director.
#[derive(Debug, Clone, Default)]
pub struct Playbook {
    remediations: IndexMap<String, ActionTemplate>,
    baseline: Vec<ActionTemplate>,
}

impl Playbook {
    /// Creates an empty playbook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps an at-risk KPI name to its remediation.
    #[must_use]
    pub fn with_remediation(mut self, kpi: impl Into<String>, template: ActionTemplate) -> Self {
        self.remediations.insert(kpi.into(), template);
        self
    }

    /// Adds an action emitted when nothing is at risk.
    #[must_use]
    pub fn with_baseline(mut self, template: ActionTemplate) -> Self {
        self.baseline.push(template);
        self
    }

    /// Number of KPI names with a recipe.
    #[must_use]
    pub fn len(&self) -> usize {
        self.remediations.len()
    }

    /// Whether the playbook has no recipes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remediations.is_empty()
    }

    /// Produces actions for the given at-risk names, or the baseline set
    /// when the list is empty. Deterministic and history-free: the same
    /// inputs always produce the same draw.
    #[must_use]
    pub fn draw(&self, at_risk: &[String]) -> PlaybookDraw {
        let mut result = PlaybookDraw::default();
        if at_risk.is_empty() {
            result.actions = self
                .baseline
                .iter()
                .map(|template| Self::materialize(template, Vec::new()))
                .collect();
        } else {
            for name in at_risk {
                match self.remediations.get(name) {
                    Some(template) => result
                        .actions
                        .push(Self::materialize(template, vec![name.clone()])),
                    None => result.unmatched.push(name.clone()),
                }
            }
        }
        result
            .actions
            .sort_by_key(|action| action.priority);
        result
    }

    fn materialize(template: &ActionTemplate, kpi_refs: Vec<String>) -> PriorityAction {
        PriorityAction {
            action: template.action.clone(),
            target: template.target.clone(),
            priority: template.priority,
            category: template.category,
            kpi_refs,
            expected_impact: template.expected_impact.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Playbook {
        Playbook::new()
            .with_remediation(
                "social_reach",
                ActionTemplate::new("Boost top posts", "social_reach", 2, TaskCategory::Campaign)
                    .with_impact("+20% impressions"),
            )
            .with_remediation(
                "audience_size",
                ActionTemplate::new("Run referral push", "audience_size", 1, TaskCategory::Outreach),
            )
            .with_baseline(ActionTemplate::new(
                "Review channel mix",
                "all KPIs",
                5,
                TaskCategory::Analysis,
            ))
    }

    #[test]
    fn draw_sorts_ascending_by_priority() {
        let playbook = sample();
        let draw = playbook.draw(&["social_reach".into(), "audience_size".into()]);
        let priorities: Vec<u8> = draw.actions.iter().map(|a| a.priority).collect();
        assert_eq!(priorities, vec![1, 2]);
        assert_eq!(draw.actions[0].kpi_refs, vec!["audience_size".to_string()]);
        assert!(draw.unmatched.is_empty());
    }

    #[test]
    fn baseline_applies_when_nothing_is_at_risk() {
        let playbook = sample();
        let draw = playbook.draw(&[]);
        assert_eq!(draw.actions.len(), 1);
        assert_eq!(draw.actions[0].action, "Review channel mix");
        assert!(draw.actions[0].kpi_refs.is_empty());
    }

    #[test]
    fn unmatched_names_are_recorded_not_fatal() {
        let playbook = sample();
        let draw = playbook.draw(&["social_reach".into(), "mystery_kpi".into()]);
        assert_eq!(draw.actions.len(), 1);
        assert_eq!(draw.unmatched, vec!["mystery_kpi".to_string()]);
    }

    #[test]
    fn draws_are_deterministic() {
        let playbook = sample();
        let at_risk = vec!["audience_size".to_string()];
        let first = playbook.draw(&at_risk);
        let second = playbook.draw(&at_risk);
        assert_eq!(first.actions.len(), second.actions.len());
        assert_eq!(first.actions[0].action, second.actions[0].action);
    }
}
