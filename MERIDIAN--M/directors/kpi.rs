//! Typed KPI registry with derived progress and status.
//!
//! Metrics must be declared with a [`KpiSpec`] before they can be recorded
//! or incremented; writes against undeclared names are rejected instead of
//! silently growing the map. Progress and status are never stored — every
//! read derives them from the current value and the target.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::director::DirectorError;

/// Reporting cadence a KPI is judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiPeriod {
    /// Judged every day.
    Daily,
    /// Judged every week.
    Weekly,
    /// Judged every month.
    Monthly,
    /// Judged every quarter.
    Quarterly,
}

impl KpiPeriod {
    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
        }
    }
}

/// Discretized standing of a KPI against its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiStatus {
    /// Progress at or above 100%.
    Exceeded,
    /// Progress at or above 75%.
    OnTrack,
    /// Progress at or above 50%.
    AtRisk,
    /// Progress below 50%.
    Behind,
}

impl KpiStatus {
    /// Human-readable label for logs and dashboards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Exceeded => "exceeded",
            Self::OnTrack => "on_track",
            Self::AtRisk => "at_risk",
            Self::Behind => "behind",
        }
    }

    /// Whether the standing calls for remediation.
    #[must_use]
    pub const fn needs_attention(self) -> bool {
        matches!(self, Self::AtRisk | Self::Behind)
    }
}

/// Declared schema for one KPI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSpec {
    /// Registry key, unique within a director.
    pub name: String,
    /// Value the KPI aims for.
    pub target: f64,
    /// Unit the value is measured in, e.g. `"usd"` or `"subscribers"`.
    pub unit: String,
    /// Cadence the KPI is judged against.
    pub period: KpiPeriod,
}

impl KpiSpec {
    /// Creates a spec.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        target: f64,
        unit: impl Into<String>,
        period: KpiPeriod,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            unit: unit.into(),
            period,
        }
    }
}

/// A declared KPI with its current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiMetric {
    /// Declared schema.
    pub spec: KpiSpec,
    /// Most recently recorded value.
    pub current: f64,
}

impl KpiMetric {
    /// Creates a metric at zero.
    #[must_use]
    pub const fn new(spec: KpiSpec) -> Self {
        Self { spec, current: 0.0 }
    }

    /// Progress toward target as a percentage. A target at or below zero
    /// yields 0 rather than dividing.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.spec.target <= 0.0 {
            0.0
        } else {
            self.current / self.spec.target * 100.0
        }
    }

    /// Standing derived from [`Self::progress`] on every call.
    #[must_use]
    pub fn status(&self) -> KpiStatus {
        let progress = self.progress();
        if progress >= 100.0 {
            KpiStatus::Exceeded
        } else if progress >= 75.0 {
            KpiStatus::OnTrack
        } else if progress >= 50.0 {
            KpiStatus::AtRisk
        } else {
            KpiStatus::Behind
        }
    }

    /// Distance left to target; negative once the target is exceeded.
    #[must_use]
    pub fn gap(&self) -> f64 {
        self.spec.target - self.current
    }
}

/// Serializable KPI row for reports and dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    /// Registry key.
    pub name: String,
    /// Declared target.
    pub target: f64,
    /// Current value.
    pub current: f64,
    /// Measurement unit.
    pub unit: String,
    /// Reporting cadence.
    pub period: KpiPeriod,
    /// Derived progress percentage.
    pub progress: f64,
    /// Derived standing.
    pub status: KpiStatus,
}

/// Declaration-ordered registry of KPIs.
#[derive(Debug, Clone, Default)]
pub struct KpiRegistry {
    metrics: IndexMap<String, KpiMetric>,
}

impl KpiRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a KPI.
    ///
    /// # Errors
    ///
    /// Returns [`DirectorError::DuplicateKpi`] when the name is taken.
    pub fn declare(&mut self, spec: KpiSpec) -> Result<(), DirectorError> {
        if self.metrics.contains_key(&spec.name) {
            return Err(DirectorError::DuplicateKpi(spec.name));
        }
        self.metrics.insert(spec.name.clone(), KpiMetric::new(spec));
        Ok(())
    }

    /// Overwrites a KPI's current value, returning the new value.
    ///
    /// # Errors
    ///
    /// Returns [`DirectorError::UnknownKpi`] when the name was never
    /// declared.
    pub fn record(&mut self, name: &str, value: f64) -> Result<f64, DirectorError> {
        let metric = self
            .metrics
            .get_mut(name)
            .ok_or_else(|| DirectorError::UnknownKpi(name.to_string()))?;
        metric.current = value;
        Ok(metric.current)
    }

    /// Adds a delta to a KPI's current value, returning the new value.
    ///
    /// # Errors
    ///
    /// Returns [`DirectorError::UnknownKpi`] when the name was never
    /// declared.
    pub fn increment(&mut self, name: &str, delta: f64) -> Result<f64, DirectorError> {
        let metric = self
            .metrics
            .get_mut(name)
            .ok_or_else(|| DirectorError::UnknownKpi(name.to_string()))?;
        metric.current += delta;
        Ok(metric.current)
    }

    /// Looks up a declared KPI.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&KpiMetric> {
        self.metrics.get(name)
    }

    /// Current value of a declared KPI.
    #[must_use]
    pub fn current(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(|metric| metric.current)
    }

    /// Names whose derived status is at risk or behind, in declaration
    /// order.
    #[must_use]
    pub fn at_risk(&self) -> Vec<String> {
        self.metrics
            .values()
            .filter(|metric| metric.status().needs_attention())
            .map(|metric| metric.spec.name.clone())
            .collect()
    }

    /// Serializable rows for every KPI, in declaration order.
    #[must_use]
    pub fn summaries(&self) -> Vec<KpiSummary> {
        self.metrics
            .values()
            .map(|metric| KpiSummary {
                name: metric.spec.name.clone(),
                target: metric.spec.target,
                current: metric.current,
                unit: metric.spec.unit.clone(),
                period: metric.spec.period,
                progress: metric.progress(),
                status: metric.status(),
            })
            .collect()
    }

    /// Declared names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.metrics.keys().cloned().collect()
    }

    /// Number of declared KPIs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Assembles a registry from a fixed schema. A later spec replaces an
/// earlier one with the same name; use [`KpiRegistry::declare`] when a
/// collision should be an error instead.
impl FromIterator<KpiSpec> for KpiRegistry {
    fn from_iter<I: IntoIterator<Item = KpiSpec>>(iter: I) -> Self {
        let mut registry = Self::new();
        for spec in iter {
            registry
                .metrics
                .insert(spec.name.clone(), KpiMetric::new(spec));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(name: &str, target: f64) -> KpiRegistry {
        let mut registry = KpiRegistry::new();
        registry
            .declare(KpiSpec::new(name, target, "units", KpiPeriod::Monthly))
            .unwrap();
        registry
    }

    #[test]
    fn zero_target_never_divides() {
        let metric = KpiMetric::new(KpiSpec::new("stalled", 0.0, "units", KpiPeriod::Daily));
        assert!((metric.progress() - 0.0).abs() < f64::EPSILON);
        assert_eq!(metric.status(), KpiStatus::Behind);
    }

    #[test]
    fn status_bands_match_progress() {
        let mut registry = registry_with("kpi", 100.0);
        for (value, expected) in [
            (100.0, KpiStatus::Exceeded),
            (80.0, KpiStatus::OnTrack),
            (60.0, KpiStatus::AtRisk),
            (10.0, KpiStatus::Behind),
        ] {
            registry.record("kpi", value).unwrap();
            assert_eq!(registry.get("kpi").unwrap().status(), expected);
        }
    }

    #[test]
    fn boundaries_are_inclusive() {
        let mut registry = registry_with("kpi", 100.0);
        registry.record("kpi", 100.0).unwrap();
        assert_eq!(registry.get("kpi").unwrap().status(), KpiStatus::Exceeded);
        registry.record("kpi", 75.0).unwrap();
        assert_eq!(registry.get("kpi").unwrap().status(), KpiStatus::OnTrack);
        registry.record("kpi", 50.0).unwrap();
        assert_eq!(registry.get("kpi").unwrap().status(), KpiStatus::AtRisk);
        registry.record("kpi", 49.9).unwrap();
        assert_eq!(registry.get("kpi").unwrap().status(), KpiStatus::Behind);
    }

    #[test]
    fn increments_move_through_the_bands() {
        let mut registry = registry_with("reach", 100.0);
        registry.increment("reach", 40.0).unwrap();
        let metric = registry.get("reach").unwrap();
        assert!((metric.progress() - 40.0).abs() < f64::EPSILON);
        assert_eq!(metric.status(), KpiStatus::Behind);

        registry.increment("reach", 20.0).unwrap();
        let metric = registry.get("reach").unwrap();
        assert!((metric.progress() - 60.0).abs() < f64::EPSILON);
        assert_eq!(metric.status(), KpiStatus::AtRisk);
        assert_eq!(registry.at_risk(), vec!["reach".to_string()]);

        registry.increment("reach", 20.0).unwrap();
        let metric = registry.get("reach").unwrap();
        assert!((metric.progress() - 80.0).abs() < f64::EPSILON);
        assert_eq!(metric.status(), KpiStatus::OnTrack);
        assert!(registry.at_risk().is_empty());
    }

    #[test]
    fn writes_require_declaration() {
        let mut registry = registry_with("known", 10.0);
        let err = registry.record("ghost", 1.0).unwrap_err();
        assert!(matches!(err, DirectorError::UnknownKpi(name) if name == "ghost"));
        let err = registry
            .declare(KpiSpec::new("known", 5.0, "units", KpiPeriod::Weekly))
            .unwrap_err();
        assert!(matches!(err, DirectorError::DuplicateKpi(name) if name == "known"));
    }

    #[test]
    fn summaries_keep_declaration_order() {
        let mut registry = KpiRegistry::new();
        for name in ["revenue", "orders", "conversion_rate"] {
            registry
                .declare(KpiSpec::new(name, 10.0, "units", KpiPeriod::Monthly))
                .unwrap();
        }
        let names: Vec<String> = registry.summaries().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["revenue", "orders", "conversion_rate"]);
    }
}
