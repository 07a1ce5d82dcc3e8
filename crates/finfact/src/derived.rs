//! Derived metric evaluation: ratios, year-over-year deltas and a fixed
//! set of named composite formulas over canonical facts.
//!
//! Composite formulas are enumerated, never parsed from user input.
//! Missing inputs and zero denominators produce an explicitly absent
//! value, not an error and not infinity.

use crate::store::FactStore;
use anyhow::Result;
use finfact_common::types::{
    DerivedMetricKind, DerivedMetricResult, Provenance, ProvenanceInput,
};
use tracing::debug;

/// Year offset for year-over-year deltas.
pub const YOY_OFFSET: i32 = 1;

/// Named composite formulas, evaluated by dedicated code paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeFormula {
    /// (operating_cash_flow - net_income) / total_assets.
    /// Positive means cash flow exceeds accounting income.
    AccrualRatio,
    /// gross_profit / revenue, reconstructing gross profit from
    /// revenue - cost_of_revenue when it is not reported directly.
    GrossMargin,
}

/// How a derived metric is computed from its named inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedSpecKind {
    Ratio {
        numerator: &'static str,
        denominator: &'static str,
    },
    Delta {
        base: &'static str,
        year_offset: i32,
    },
    Composite {
        formula: CompositeFormula,
    },
}

/// Static configuration of one derived metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedMetricSpec {
    pub name: &'static str,
    pub kind: DerivedSpecKind,
}

/// Built-in derived metric registry.
pub const BUILTIN_SPECS: &[DerivedMetricSpec] = &[
    DerivedMetricSpec {
        name: "net_margin",
        kind: DerivedSpecKind::Ratio {
            numerator: "net_income",
            denominator: "revenue",
        },
    },
    DerivedMetricSpec {
        name: "roa",
        kind: DerivedSpecKind::Ratio {
            numerator: "net_income",
            denominator: "total_assets",
        },
    },
    DerivedMetricSpec {
        name: "current_ratio",
        kind: DerivedSpecKind::Ratio {
            numerator: "current_assets",
            denominator: "current_liabilities",
        },
    },
    DerivedMetricSpec {
        name: "asset_turnover",
        kind: DerivedSpecKind::Ratio {
            numerator: "revenue",
            denominator: "total_assets",
        },
    },
    DerivedMetricSpec {
        name: "leverage",
        kind: DerivedSpecKind::Ratio {
            numerator: "long_term_debt",
            denominator: "total_assets",
        },
    },
    DerivedMetricSpec {
        name: "revenue_yoy_delta",
        kind: DerivedSpecKind::Delta {
            base: "revenue",
            year_offset: YOY_OFFSET,
        },
    },
    DerivedMetricSpec {
        name: "net_income_yoy_delta",
        kind: DerivedSpecKind::Delta {
            base: "net_income",
            year_offset: YOY_OFFSET,
        },
    },
    DerivedMetricSpec {
        name: "accrual_ratio",
        kind: DerivedSpecKind::Composite {
            formula: CompositeFormula::AccrualRatio,
        },
    },
    DerivedMetricSpec {
        name: "gross_margin",
        kind: DerivedSpecKind::Composite {
            formula: CompositeFormula::GrossMargin,
        },
    },
];

/// Look up a built-in spec by name.
pub fn find_spec(name: &str) -> Option<&'static DerivedMetricSpec> {
    BUILTIN_SPECS.iter().find(|spec| spec.name == name)
}

/// Evaluate a derived metric for one company and year.
///
/// Deterministic: unchanged canonical inputs yield a value-identical
/// result. Persistence is the caller's choice via [`evaluate_and_store`].
pub fn evaluate(
    store: &FactStore,
    spec: &DerivedMetricSpec,
    company: &str,
    year: i32,
) -> Result<DerivedMetricResult> {
    let (value, kind, provenance) = match spec.kind {
        DerivedSpecKind::Ratio {
            numerator,
            denominator,
        } => {
            let num = store.get_canonical(numerator, year, company)?;
            let den = store.get_canonical(denominator, year, company)?;
            let value = match (num, den) {
                (Some(n), Some(d)) if d != 0.0 => Some(n / d),
                _ => None,
            };
            let provenance = Provenance {
                inputs: vec![
                    input(numerator, year, num),
                    input(denominator, year, den),
                ],
                formula: None,
                fallback_used: false,
            };
            (value, DerivedMetricKind::Ratio, provenance)
        }
        DerivedSpecKind::Delta { base, year_offset } => {
            let current = store.get_canonical(base, year, company)?;
            let prior = store.get_canonical(base, year - year_offset, company)?;
            let value = match (current, prior) {
                (Some(c), Some(p)) => Some(c - p),
                _ => None,
            };
            let provenance = Provenance {
                inputs: vec![
                    input(base, year, current),
                    input(base, year - year_offset, prior),
                ],
                formula: None,
                fallback_used: false,
            };
            (value, DerivedMetricKind::Delta, provenance)
        }
        DerivedSpecKind::Composite { formula } => {
            let (value, provenance) = evaluate_composite(store, formula, company, year)?;
            (value, DerivedMetricKind::Composite, provenance)
        }
    };

    debug!(
        "Evaluated {} for {}/{}: {:?}",
        spec.name, company, year, value
    );

    Ok(DerivedMetricResult {
        company: company.to_string(),
        year,
        metric: spec.name.to_string(),
        value,
        kind,
        provenance,
    })
}

/// Evaluate and persist in one call; the stored record replaces any
/// previous computation for the same key.
pub fn evaluate_and_store(
    store: &FactStore,
    spec: &DerivedMetricSpec,
    company: &str,
    year: i32,
) -> Result<DerivedMetricResult> {
    let result = evaluate(store, spec, company, year)?;
    store.put_derived(&result)?;
    Ok(result)
}

fn evaluate_composite(
    store: &FactStore,
    formula: CompositeFormula,
    company: &str,
    year: i32,
) -> Result<(Option<f64>, Provenance)> {
    match formula {
        CompositeFormula::AccrualRatio => {
            let cfo = store.get_canonical("operating_cash_flow", year, company)?;
            let net_income = store.get_canonical("net_income", year, company)?;
            let assets = store.get_canonical("total_assets", year, company)?;
            let value = match (cfo, net_income, assets) {
                (Some(c), Some(n), Some(a)) if a != 0.0 => Some((c - n) / a),
                _ => None,
            };
            let provenance = Provenance {
                inputs: vec![
                    input("operating_cash_flow", year, cfo),
                    input("net_income", year, net_income),
                    input("total_assets", year, assets),
                ],
                formula: Some("accrual_ratio".to_string()),
                fallback_used: false,
            };
            Ok((value, provenance))
        }
        CompositeFormula::GrossMargin => {
            let revenue = store.get_canonical("revenue", year, company)?;
            let gross_profit = store.get_canonical("gross_profit", year, company)?;

            let mut inputs = vec![
                input("revenue", year, revenue),
                input("gross_profit", year, gross_profit),
            ];
            let mut fallback_used = false;

            let value = match (revenue, gross_profit) {
                (Some(r), Some(g)) if r != 0.0 => Some(g / r),
                (Some(r), None) if r != 0.0 => {
                    // Reconstruct from cost of revenue when gross profit
                    // is not reported directly.
                    let cost = store.get_canonical("cost_of_revenue", year, company)?;
                    inputs.push(input("cost_of_revenue", year, cost));
                    match cost {
                        Some(c) => {
                            fallback_used = true;
                            Some((r - c) / r)
                        }
                        None => None,
                    }
                }
                _ => None,
            };

            let provenance = Provenance {
                inputs,
                formula: Some("gross_margin".to_string()),
                fallback_used,
            };
            Ok((value, provenance))
        }
    }
}

fn input(metric: &str, year: i32, value: Option<f64>) -> ProvenanceInput {
    ProvenanceInput {
        metric: metric.to_string(),
        year,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finfact_common::types::CanonicalFact;

    fn seed(store: &FactStore, facts: &[(&str, i32, &str, f64)]) {
        for &(company, year, metric, value) in facts {
            store
                .put_canonical(&CanonicalFact {
                    company: company.to_string(),
                    year,
                    metric: metric.to_string(),
                    value,
                    source_count: 1,
                })
                .unwrap();
        }
    }

    #[test]
    fn test_ratio_computes() {
        let store = FactStore::open_in_memory().unwrap();
        seed(
            &store,
            &[
                ("Test Corp", 2023, "net_income", 150_000.0),
                ("Test Corp", 2023, "total_assets", 2_200_000.0),
            ],
        );
        let result = evaluate(&store, find_spec("roa").unwrap(), "Test Corp", 2023).unwrap();
        let value = result.value.unwrap();
        assert!((value - 0.068181818).abs() < 1e-6);
        assert_eq!(result.kind, DerivedMetricKind::Ratio);
        assert_eq!(result.provenance.inputs[0].metric, "net_income");
        assert_eq!(result.provenance.inputs[1].metric, "total_assets");
    }

    #[test]
    fn test_ratio_absent_on_missing_input() {
        let store = FactStore::open_in_memory().unwrap();
        seed(&store, &[("Test Corp", 2023, "net_income", 150_000.0)]);
        let result = evaluate(&store, find_spec("roa").unwrap(), "Test Corp", 2023).unwrap();
        assert_eq!(result.value, None);
        // The missing input is still recorded in provenance
        assert_eq!(result.provenance.inputs[1].value, None);
    }

    #[test]
    fn test_ratio_absent_on_zero_denominator() {
        let store = FactStore::open_in_memory().unwrap();
        seed(
            &store,
            &[
                ("Test Corp", 2023, "net_income", 150_000.0),
                ("Test Corp", 2023, "total_assets", 0.0),
            ],
        );
        let result = evaluate(&store, find_spec("roa").unwrap(), "Test Corp", 2023).unwrap();
        assert_eq!(result.value, None);
    }

    #[test]
    fn test_delta_year_over_year() {
        let store = FactStore::open_in_memory().unwrap();
        seed(
            &store,
            &[
                ("Test Corp", 2022, "revenue", 1_000_000.0),
                ("Test Corp", 2023, "revenue", 1_200_000.0),
            ],
        );
        let spec = find_spec("revenue_yoy_delta").unwrap();
        let result = evaluate(&store, spec, "Test Corp", 2023).unwrap();
        assert_eq!(result.value, Some(200_000.0));
        assert_eq!(result.kind, DerivedMetricKind::Delta);

        let years: Vec<i32> = result.provenance.inputs.iter().map(|i| i.year).collect();
        assert_eq!(years, vec![2023, 2022]);

        // Missing prior year -> absent
        let result = evaluate(&store, spec, "Test Corp", 2022).unwrap();
        assert_eq!(result.value, None);
    }

    #[test]
    fn test_accrual_ratio_composite() {
        let store = FactStore::open_in_memory().unwrap();
        seed(
            &store,
            &[
                ("Test Corp", 2023, "operating_cash_flow", 180_000.0),
                ("Test Corp", 2023, "net_income", 150_000.0),
                ("Test Corp", 2023, "total_assets", 2_000_000.0),
            ],
        );
        let spec = find_spec("accrual_ratio").unwrap();
        let result = evaluate(&store, spec, "Test Corp", 2023).unwrap();
        assert_eq!(result.value, Some(0.015));
        assert!(!result.provenance.fallback_used);
    }

    #[test]
    fn test_gross_margin_fallback_path() {
        let store = FactStore::open_in_memory().unwrap();
        seed(
            &store,
            &[
                ("Test Corp", 2023, "revenue", 1_000_000.0),
                ("Test Corp", 2023, "cost_of_revenue", 600_000.0),
            ],
        );
        let spec = find_spec("gross_margin").unwrap();
        let result = evaluate(&store, spec, "Test Corp", 2023).unwrap();
        assert_eq!(result.value, Some(0.4));
        assert!(result.provenance.fallback_used);

        // Direct gross profit wins over reconstruction
        seed(&store, &[("Test Corp", 2023, "gross_profit", 500_000.0)]);
        let result = evaluate(&store, spec, "Test Corp", 2023).unwrap();
        assert_eq!(result.value, Some(0.5));
        assert!(!result.provenance.fallback_used);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let store = FactStore::open_in_memory().unwrap();
        seed(
            &store,
            &[
                ("Test Corp", 2023, "net_income", 20.0),
                ("Test Corp", 2023, "revenue", 200.0),
            ],
        );
        let spec = find_spec("net_margin").unwrap();
        let a = evaluate_and_store(&store, spec, "Test Corp", 2023).unwrap();
        let b = evaluate_and_store(&store, spec, "Test Corp", 2023).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.value, Some(0.1));
        assert_eq!(store.get_derived("net_margin", 2023, "Test Corp").unwrap(), Some(0.1));
    }
}
