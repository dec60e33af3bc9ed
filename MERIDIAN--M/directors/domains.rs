//! The four standing directors and their runners.
//!
//! Each constructor wires a fixed KPI schema, a remediation playbook, and
//! a runner whose effects are deterministic, so repeated passes over the
//! same tasks always move the same KPIs by the same amounts.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::director::{Director, DirectorDomain, DirectorError, TaskRunner};
use crate::kpi::{KpiPeriod, KpiRegistry, KpiSpec};
use crate::playbook::{ActionTemplate, Playbook};
use crate::task::{DirectorTask, TaskCategory};

fn unsupported(domain: DirectorDomain, category: TaskCategory) -> DirectorError {
    DirectorError::UnsupportedCategory {
        domain: domain.label().to_string(),
        category: category.label().to_string(),
    }
}

fn findings(task: &DirectorTask, kpis: &KpiRegistry) -> Value {
    json!({
        "analysis": task.title,
        "kpis_reviewed": kpis.len(),
        "at_risk": kpis.at_risk(),
    })
}

struct MarketingRunner;

impl TaskRunner for MarketingRunner {
    fn execute(&self, task: &DirectorTask, kpis: &mut KpiRegistry) -> Result<Value, DirectorError> {
        match task.category {
            TaskCategory::Campaign => {
                let reach = kpis.increment("social_reach", 2_500.0)?;
                Ok(json!({ "campaign": task.title, "social_reach": reach }))
            }
            TaskCategory::Content => {
                let published = kpis.increment("content_published", 1.0)?;
                let audience = kpis.increment("audience_size", 150.0)?;
                Ok(json!({
                    "asset": task.title,
                    "content_published": published,
                    "audience_size": audience,
                }))
            }
            TaskCategory::Outreach => {
                let audience = kpis.increment("audience_size", 400.0)?;
                Ok(json!({ "outreach": task.title, "audience_size": audience }))
            }
            TaskCategory::Analysis => Ok(findings(task, kpis)),
            TaskCategory::Coordination => Ok(json!({ "coordinated": task.title })),
            category => Err(unsupported(DirectorDomain::Marketing, category)),
        }
    }
}

/// The marketing director: audience growth, reach, and content output.
#[must_use]
pub fn marketing() -> Director {
    let kpis: KpiRegistry = [
        KpiSpec::new("audience_size", 25_000.0, "subscribers", KpiPeriod::Monthly),
        KpiSpec::new("social_reach", 50_000.0, "impressions", KpiPeriod::Weekly),
        KpiSpec::new("content_published", 12.0, "assets", KpiPeriod::Monthly),
    ]
    .into_iter()
    .collect();
    let playbook = Playbook::new()
        .with_remediation(
            "audience_size",
            ActionTemplate::new(
                "Run a referral push across owned channels",
                "audience_size",
                1,
                TaskCategory::Outreach,
            )
            .with_impact("+400 subscribers per pass"),
        )
        .with_remediation(
            "social_reach",
            ActionTemplate::new(
                "Boost top-performing posts",
                "social_reach",
                2,
                TaskCategory::Campaign,
            )
            .with_impact("+2500 impressions per pass"),
        )
        .with_remediation(
            "content_published",
            ActionTemplate::new(
                "Ship one asset from the content backlog",
                "content_published",
                3,
                TaskCategory::Content,
            ),
        )
        .with_baseline(ActionTemplate::new(
            "Review channel mix and engagement",
            "all marketing KPIs",
            5,
            TaskCategory::Analysis,
        ));
    Director::new("marketing", DirectorDomain::Marketing, Arc::new(MarketingRunner))
        .with_kpis(kpis)
        .with_playbook(playbook)
}

struct CommerceRunner;

impl TaskRunner for CommerceRunner {
    fn execute(&self, task: &DirectorTask, kpis: &mut KpiRegistry) -> Result<Value, DirectorError> {
        match task.category {
            TaskCategory::Campaign => {
                let revenue = kpis.increment("revenue", 1_800.0)?;
                let orders = kpis.increment("orders", 20.0)?;
                Ok(json!({
                    "campaign": task.title,
                    "revenue": revenue,
                    "orders": orders,
                }))
            }
            TaskCategory::Pricing => {
                let conversion = kpis.increment("conversion_rate", 0.2)?;
                Ok(json!({ "repriced": task.title, "conversion_rate": conversion }))
            }
            TaskCategory::Analysis => Ok(findings(task, kpis)),
            TaskCategory::Coordination => Ok(json!({ "coordinated": task.title })),
            category => Err(unsupported(DirectorDomain::Commerce, category)),
        }
    }
}

/// The commerce director: revenue, order volume, and conversion.
#[must_use]
pub fn commerce() -> Director {
    let kpis: KpiRegistry = [
        KpiSpec::new("revenue", 40_000.0, "usd", KpiPeriod::Monthly),
        KpiSpec::new("orders", 500.0, "orders", KpiPeriod::Monthly),
        KpiSpec::new("conversion_rate", 3.5, "percent", KpiPeriod::Weekly),
    ]
    .into_iter()
    .collect();
    let playbook = Playbook::new()
        .with_remediation(
            "revenue",
            ActionTemplate::new(
                "Bundle slow movers into a limited offer",
                "revenue",
                1,
                TaskCategory::Campaign,
            )
            .with_impact("+1800 usd per pass"),
        )
        .with_remediation(
            "orders",
            ActionTemplate::new(
                "Trigger a win-back campaign for lapsed buyers",
                "orders",
                2,
                TaskCategory::Campaign,
            )
            .with_impact("+20 orders per pass"),
        )
        .with_remediation(
            "conversion_rate",
            ActionTemplate::new(
                "Review pricing against basket analytics",
                "conversion_rate",
                2,
                TaskCategory::Pricing,
            )
            .with_impact("+0.2pp conversion"),
        )
        .with_baseline(ActionTemplate::new(
            "Audit the storefront funnel",
            "all commerce KPIs",
            5,
            TaskCategory::Analysis,
        ));
    Director::new("commerce", DirectorDomain::Commerce, Arc::new(CommerceRunner))
        .with_kpis(kpis)
        .with_playbook(playbook)
}

struct OperationsRunner;

impl TaskRunner for OperationsRunner {
    fn execute(&self, task: &DirectorTask, kpis: &mut KpiRegistry) -> Result<Value, DirectorError> {
        match task.category {
            TaskCategory::Fulfilment => {
                // Success rate is a percentage; retries can only take it
                // to 100, never past it.
                let current = kpis.current("delivery_success_rate").unwrap_or(0.0);
                let rate = kpis.record("delivery_success_rate", (current + 1.5).min(100.0))?;
                let fulfilled = kpis.increment("orders_fulfilled", 25.0)?;
                Ok(json!({
                    "batch": task.title,
                    "delivery_success_rate": rate,
                    "orders_fulfilled": fulfilled,
                }))
            }
            TaskCategory::Analysis => {
                let coverage = kpis.increment("automation_coverage", 5.0)?;
                Ok(json!({ "scripted": task.title, "automation_coverage": coverage }))
            }
            TaskCategory::Coordination => Ok(json!({ "coordinated": task.title })),
            category => Err(unsupported(DirectorDomain::Operations, category)),
        }
    }
}

/// The operations director: delivery reliability and fulfilment throughput.
#[must_use]
pub fn operations() -> Director {
    let kpis: KpiRegistry = [
        KpiSpec::new("delivery_success_rate", 98.0, "percent", KpiPeriod::Weekly),
        KpiSpec::new("orders_fulfilled", 480.0, "orders", KpiPeriod::Monthly),
        KpiSpec::new("automation_coverage", 75.0, "percent", KpiPeriod::Quarterly),
    ]
    .into_iter()
    .collect();
    let playbook = Playbook::new()
        .with_remediation(
            "delivery_success_rate",
            ActionTemplate::new(
                "Re-run failed deliveries through the retry lane",
                "delivery_success_rate",
                1,
                TaskCategory::Fulfilment,
            )
            .with_impact("+1.5pp success rate"),
        )
        .with_remediation(
            "orders_fulfilled",
            ActionTemplate::new(
                "Clear the oldest fulfilment batch",
                "orders_fulfilled",
                2,
                TaskCategory::Fulfilment,
            )
            .with_impact("+25 orders per pass"),
        )
        .with_remediation(
            "automation_coverage",
            ActionTemplate::new(
                "Script the most repeated manual step",
                "automation_coverage",
                3,
                TaskCategory::Analysis,
            )
            .with_impact("+5pp coverage"),
        )
        .with_baseline(ActionTemplate::new(
            "Sync carrier SLAs and cutoffs",
            "all operations KPIs",
            5,
            TaskCategory::Coordination,
        ));
    Director::new("operations", DirectorDomain::Operations, Arc::new(OperationsRunner))
        .with_kpis(kpis)
        .with_playbook(playbook)
}

struct CommunityRunner;

impl TaskRunner for CommunityRunner {
    fn execute(&self, task: &DirectorTask, kpis: &mut KpiRegistry) -> Result<Value, DirectorError> {
        match task.category {
            TaskCategory::Outreach => {
                let members = kpis.increment("active_members", 120.0)?;
                Ok(json!({ "outreach": task.title, "active_members": members }))
            }
            TaskCategory::Content => {
                let engagement = kpis.increment("engagement_rate", 0.4)?;
                Ok(json!({ "thread": task.title, "engagement_rate": engagement }))
            }
            TaskCategory::Coordination => {
                let events = kpis.increment("events_hosted", 1.0)?;
                Ok(json!({ "scheduled": task.title, "events_hosted": events }))
            }
            TaskCategory::Analysis => Ok(findings(task, kpis)),
            category => Err(unsupported(DirectorDomain::Community, category)),
        }
    }
}

/// The community director: membership, engagement, and events.
#[must_use]
pub fn community() -> Director {
    let kpis: KpiRegistry = [
        KpiSpec::new("active_members", 3_000.0, "members", KpiPeriod::Monthly),
        KpiSpec::new("engagement_rate", 6.0, "percent", KpiPeriod::Weekly),
        KpiSpec::new("events_hosted", 8.0, "events", KpiPeriod::Quarterly),
    ]
    .into_iter()
    .collect();
    let playbook = Playbook::new()
        .with_remediation(
            "active_members",
            ActionTemplate::new(
                "Personally welcome this week's joiners",
                "active_members",
                1,
                TaskCategory::Outreach,
            )
            .with_impact("+120 members per pass"),
        )
        .with_remediation(
            "engagement_rate",
            ActionTemplate::new(
                "Seed a discussion thread from member questions",
                "engagement_rate",
                2,
                TaskCategory::Content,
            )
            .with_impact("+0.4pp engagement"),
        )
        .with_remediation(
            "events_hosted",
            ActionTemplate::new(
                "Schedule the next community session",
                "events_hosted",
                3,
                TaskCategory::Coordination,
            ),
        )
        .with_baseline(ActionTemplate::new(
            "Survey member sentiment",
            "all community KPIs",
            5,
            TaskCategory::Analysis,
        ));
    Director::new("community", DirectorDomain::Community, Arc::new(CommunityRunner))
        .with_kpis(kpis)
        .with_playbook(playbook)
}

/// All four standing directors in canonical registration order.
#[must_use]
pub fn standing_directors() -> Vec<Director> {
    vec![marketing(), commerce(), operations(), community()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    #[test]
    fn marketing_remediates_weak_reach_with_a_campaign() {
        let mut director = marketing();
        director.record_kpi("audience_size", 24_000.0).unwrap();
        director.record_kpi("social_reach", 10_000.0).unwrap();
        director.record_kpi("content_published", 11.0).unwrap();
        assert_eq!(director.at_risk(), vec!["social_reach".to_string()]);
        let actions = director.priority_actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, "Boost top-performing posts");
        assert_eq!(actions[0].category, TaskCategory::Campaign);
        assert_eq!(actions[0].kpi_refs, vec!["social_reach".to_string()]);
    }

    #[test]
    fn commerce_campaign_moves_revenue_and_orders() {
        let mut director = commerce();
        director.assign_task(DirectorTask::new(
            "Bundle slow movers",
            "limited offer",
            TaskCategory::Campaign,
            1,
        ));
        let reports = director.process_pending_tasks();
        assert_eq!(reports[0].status, TaskStatus::Completed);
        assert!((director.kpis().current("revenue").unwrap() - 1_800.0).abs() < f64::EPSILON);
        assert!((director.kpis().current("orders").unwrap() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn operations_blocks_foreign_categories() {
        let mut director = operations();
        director.assign_task(DirectorTask::new(
            "Reprice tees",
            "not an ops job",
            TaskCategory::Pricing,
            1,
        ));
        let reports = director.process_pending_tasks();
        assert_eq!(reports[0].status, TaskStatus::Blocked);
        let error = reports[0].result.as_ref().unwrap()["error"].as_str().unwrap();
        assert!(error.contains("does not run pricing tasks"));
    }

    #[test]
    fn delivery_success_rate_never_exceeds_hundred() {
        let mut director = operations();
        director.record_kpi("delivery_success_rate", 99.5).unwrap();
        director.assign_task(DirectorTask::new(
            "Retry lane",
            "",
            TaskCategory::Fulfilment,
            1,
        ));
        director.process_pending_tasks();
        assert!(
            (director.kpis().current("delivery_success_rate").unwrap() - 100.0).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn community_coordination_hosts_an_event() {
        let mut director = community();
        director.assign_task(DirectorTask::new(
            "Monthly AMA",
            "book speaker",
            TaskCategory::Coordination,
            2,
        ));
        director.process_pending_tasks();
        assert!((director.kpis().current("events_hosted").unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn standing_directors_cover_all_domains() {
        let directors = standing_directors();
        let domains: Vec<DirectorDomain> = directors.iter().map(Director::domain).collect();
        assert_eq!(
            domains,
            vec![
                DirectorDomain::Marketing,
                DirectorDomain::Commerce,
                DirectorDomain::Operations,
                DirectorDomain::Community,
            ]
        );
        for director in &directors {
            assert_eq!(director.kpis().len(), 3);
            assert!(!director.priority_actions().is_empty());
        }
    }
}
