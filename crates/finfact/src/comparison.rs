//! Multi-company comparison: rank resolved values descending, report an
//! explicit tie when top values are equal, and flag companies with
//! absent values instead of dropping them.

use crate::derived;
use crate::store::FactStore;
use anyhow::Result;
use finfact_common::types::{ComparisonOutcome, RankedValue};
use tracing::debug;

/// What the comparison consulted, for confidence scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComparisonSignals {
    /// At least one value came through a derived-metric computation.
    pub derived_used: bool,
    /// At least one canonical value was reduced from multiple raw
    /// observations.
    pub aggregated: bool,
}

/// Rank already-fetched values. Pure; the store-backed entry point is
/// [`compare_companies`].
pub fn compare(values: Vec<(String, Option<f64>)>) -> ComparisonOutcome {
    let mut missing = Vec::new();
    let mut ranked = Vec::new();
    for (company, value) in values {
        match value {
            Some(v) => ranked.push(RankedValue { company, value: v }),
            None => missing.push(company),
        }
    }
    // Stable sort keeps input order among equals
    ranked.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));

    if ranked.len() < 2 {
        return ComparisonOutcome::InsufficientData { ranked, missing };
    }

    let top = ranked[0].value;
    let tied: Vec<String> = ranked
        .iter()
        .filter(|r| r.value == top)
        .map(|r| r.company.clone())
        .collect();
    if tied.len() > 1 {
        return ComparisonOutcome::Tie {
            companies: tied,
            value: top,
            ranked,
            missing,
        };
    }

    ComparisonOutcome::Winner {
        winner: ranked[0].clone(),
        loser: ranked[ranked.len() - 1].clone(),
        ranked,
        missing,
    }
}

/// Fetch one value per company for metric/year and rank them.
///
/// Canonical values are preferred; when the metric names a derived spec
/// the evaluator supplies the value instead, which the caller must
/// reflect in the confidence path.
pub fn compare_companies(
    store: &FactStore,
    companies: &[String],
    metric: &str,
    year: i32,
) -> Result<(ComparisonOutcome, ComparisonSignals)> {
    let mut signals = ComparisonSignals::default();
    let mut values = Vec::with_capacity(companies.len());

    for company in companies {
        let value = match store.get_canonical_with_count(metric, year, company)? {
            Some((value, count)) => {
                if count > 1 {
                    signals.aggregated = true;
                }
                Some(value)
            }
            None => match derived::find_spec(metric) {
                Some(spec) => {
                    let result = derived::evaluate(store, spec, company, year)?;
                    if result.value.is_some() {
                        signals.derived_used = true;
                    }
                    result.value
                }
                None => None,
            },
        };
        values.push((company.clone(), value));
    }

    let outcome = compare(values);
    debug!(
        "Compared {} companies on {}/{}: derived_used={}",
        companies.len(),
        metric,
        year,
        signals.derived_used
    );
    Ok((outcome, signals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use finfact_common::types::CanonicalFact;

    #[test]
    fn test_winner_and_loser() {
        let outcome = compare(vec![
            ("Alpha".to_string(), Some(200.0)),
            ("Beta".to_string(), Some(100.0)),
            ("Gamma".to_string(), Some(150.0)),
        ]);
        match outcome {
            ComparisonOutcome::Winner { winner, loser, ranked, missing } => {
                assert_eq!(winner.company, "Alpha");
                assert_eq!(loser.company, "Beta");
                assert_eq!(ranked.len(), 3);
                assert!(missing.is_empty());
            }
            other => panic!("expected winner, got {:?}", other),
        }
    }

    #[test]
    fn test_equal_values_are_an_explicit_tie() {
        let outcome = compare(vec![
            ("Alpha".to_string(), Some(100.0)),
            ("Beta".to_string(), Some(100.0)),
        ]);
        match outcome {
            ComparisonOutcome::Tie { companies, value, .. } => {
                assert_eq!(companies, vec!["Alpha", "Beta"]);
                assert_eq!(value, 100.0);
            }
            other => panic!("expected tie, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_values_flagged_not_dropped() {
        let outcome = compare(vec![
            ("Alpha".to_string(), Some(200.0)),
            ("Beta".to_string(), None),
            ("Gamma".to_string(), Some(100.0)),
        ]);
        match outcome {
            ComparisonOutcome::Winner { missing, ranked, .. } => {
                assert_eq!(missing, vec!["Beta"]);
                assert_eq!(ranked.len(), 2);
            }
            other => panic!("expected winner, got {:?}", other),
        }
    }

    #[test]
    fn test_fewer_than_two_resolved_is_insufficient() {
        let outcome = compare(vec![
            ("Alpha".to_string(), Some(200.0)),
            ("Beta".to_string(), None),
        ]);
        assert!(matches!(outcome, ComparisonOutcome::InsufficientData { .. }));
    }

    #[test]
    fn test_compare_companies_uses_derived_fallback() {
        let store = FactStore::open_in_memory().unwrap();
        for (company, net_income, revenue) in
            [("Alpha", 20.0, 200.0), ("Beta", 10.0, 400.0)]
        {
            for (metric, value) in [("net_income", net_income), ("revenue", revenue)] {
                store
                    .put_canonical(&CanonicalFact {
                        company: company.to_string(),
                        year: 2023,
                        metric: metric.to_string(),
                        value,
                        source_count: 1,
                    })
                    .unwrap();
            }
        }

        let companies = vec!["Alpha".to_string(), "Beta".to_string()];
        let (outcome, signals) =
            compare_companies(&store, &companies, "net_margin", 2023).unwrap();
        assert!(signals.derived_used);
        match outcome {
            ComparisonOutcome::Winner { winner, .. } => {
                assert_eq!(winner.company, "Alpha"); // 0.10 vs 0.025
            }
            other => panic!("expected winner, got {:?}", other),
        }
    }
}
