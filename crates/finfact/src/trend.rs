//! Time-series directional classification.
//!
//! Absent years are gaps, never zero. Differences are taken between
//! consecutive resolvable points; the label is increasing/decreasing
//! only when every difference agrees in sign.

use crate::derived::{self, DerivedMetricSpec};
use crate::store::FactStore;
use anyhow::Result;
use finfact_common::types::TrendLabel;
use tracing::debug;

/// A labeled series for one (company, metric).
#[derive(Debug, Clone, PartialEq)]
pub struct TrendAnalysis {
    pub label: TrendLabel,
    pub series: Vec<(i32, Option<f64>)>,
}

impl TrendAnalysis {
    /// Points that actually resolved to a value.
    pub fn resolved_points(&self) -> usize {
        self.series.iter().filter(|(_, v)| v.is_some()).count()
    }

    /// True when at least one requested year had no canonical value.
    pub fn has_gaps(&self) -> bool {
        self.series.iter().any(|(_, v)| v.is_none())
    }
}

/// Fetch the canonical series for the given years and classify it.
pub fn analyze(
    store: &FactStore,
    company: &str,
    metric: &str,
    years: &[i32],
) -> Result<TrendAnalysis> {
    let mut sorted_years = years.to_vec();
    sorted_years.sort_unstable();
    sorted_years.dedup();

    let series = store.get_timeseries(company, metric, &sorted_years)?;
    let label = classify_series(&series);
    debug!(
        "Trend for {}/{} over {:?}: {}",
        company,
        metric,
        sorted_years,
        label.as_str()
    );
    Ok(TrendAnalysis { label, series })
}

/// Evaluate a derived metric per year and classify the resulting series.
/// Years where the evaluation comes back absent are gaps, same as
/// missing canonical values.
pub fn analyze_derived(
    store: &FactStore,
    spec: &DerivedMetricSpec,
    company: &str,
    years: &[i32],
) -> Result<TrendAnalysis> {
    let mut sorted_years = years.to_vec();
    sorted_years.sort_unstable();
    sorted_years.dedup();

    let mut series = Vec::with_capacity(sorted_years.len());
    for &year in &sorted_years {
        let result = derived::evaluate(store, spec, company, year)?;
        series.push((year, result.value));
    }
    let label = classify_series(&series);
    debug!(
        "Derived trend for {}/{} over {:?}: {}",
        company,
        spec.name,
        sorted_years,
        label.as_str()
    );
    Ok(TrendAnalysis { label, series })
}

/// Classify an already-fetched (year, value) series.
pub fn classify_series(series: &[(i32, Option<f64>)]) -> TrendLabel {
    let points: Vec<f64> = series.iter().filter_map(|(_, v)| *v).collect();
    if points.len() < 2 {
        return TrendLabel::InsufficientData;
    }

    let diffs: Vec<f64> = points.windows(2).map(|w| w[1] - w[0]).collect();
    if diffs.iter().all(|d| *d > 0.0) {
        TrendLabel::Increasing
    } else if diffs.iter().all(|d| *d < 0.0) {
        TrendLabel::Decreasing
    } else {
        TrendLabel::Mixed
    }
}
