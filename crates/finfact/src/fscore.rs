//! Piotroski F-Score: nine deterministic signals over canonical facts.
//!
//! No inference anywhere. A signal whose inputs are missing scores None
//! and is excluded from the computable total; the overall score is the
//! sum of the signals that could be evaluated.

use crate::store::FactStore;
use anyhow::Result;
use finfact_common::types::{
    DerivedMetricKind, DerivedMetricResult, Provenance, ProvenanceInput,
};
use serde::Serialize;
use tracing::debug;

/// One evaluated signal with the values it consulted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalResult {
    pub name: &'static str,
    /// 1, 0, or None when the inputs were unavailable.
    pub score: Option<u8>,
    /// The numeric value the decision was made on.
    pub value: Option<f64>,
    pub inputs: Vec<ProvenanceInput>,
}

/// Full F-Score for one company and year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FScore {
    pub company: String,
    pub year: i32,
    /// Sum over computable signals, None when nothing was computable.
    pub total: Option<u8>,
    /// Number of signals that could be evaluated (out of 9).
    pub computable: u8,
    pub signals: Vec<SignalResult>,
}

/// Compute all nine signals for a company and year.
pub fn compute(store: &FactStore, company: &str, year: i32) -> Result<FScore> {
    let signals = vec![
        roa_positive(store, company, year)?,
        cfo_positive(store, company, year)?,
        delta_roa_positive(store, company, year)?,
        accruals_quality(store, company, year)?,
        delta_leverage_negative(store, company, year)?,
        delta_liquidity_positive(store, company, year)?,
        no_equity_issuance(store, company, year)?,
        delta_gross_margin_positive(store, company, year)?,
        delta_asset_turnover_positive(store, company, year)?,
    ];

    let computable = signals.iter().filter(|s| s.score.is_some()).count() as u8;
    let total: u8 = signals.iter().filter_map(|s| s.score).sum();

    debug!(
        "F-Score for {}/{}: {:?}/{} computable",
        company, year, total, computable
    );

    Ok(FScore {
        company: company.to_string(),
        year,
        total: if computable > 0 { Some(total) } else { None },
        computable,
        signals,
    })
}

/// Compute and persist: one derived-metric row per signal plus a summary
/// row, each carrying its provenance.
pub fn compute_and_store(store: &FactStore, company: &str, year: i32) -> Result<FScore> {
    let fscore = compute(store, company, year)?;

    for signal in &fscore.signals {
        store.put_derived(&DerivedMetricResult {
            company: company.to_string(),
            year,
            metric: format!("piotroski_{}", signal.name),
            value: signal.score.map(f64::from),
            kind: DerivedMetricKind::Composite,
            provenance: Provenance {
                inputs: signal.inputs.clone(),
                formula: Some(signal.name.to_string()),
                fallback_used: false,
            },
        })?;
    }

    let summary_inputs: Vec<ProvenanceInput> = fscore
        .signals
        .iter()
        .map(|s| ProvenanceInput {
            metric: format!("piotroski_{}", s.name),
            year,
            value: s.score.map(f64::from),
        })
        .collect();
    store.put_derived(&DerivedMetricResult {
        company: company.to_string(),
        year,
        metric: "piotroski_f_score".to_string(),
        value: fscore.total.map(f64::from),
        kind: DerivedMetricKind::Composite,
        provenance: Provenance {
            inputs: summary_inputs,
            formula: Some("piotroski_f_score".to_string()),
            fallback_used: false,
        },
    })?;

    Ok(fscore)
}

// === Profitability signals ===

/// Signal 1: ROA > 0.
fn roa_positive(store: &FactStore, company: &str, year: i32) -> Result<SignalResult> {
    let (roa, inputs) = ratio(store, company, "net_income", "total_assets", year)?;
    Ok(signal("roa_positive", roa, roa.map(|v| v > 0.0), inputs))
}

/// Signal 2: operating cash flow > 0.
fn cfo_positive(store: &FactStore, company: &str, year: i32) -> Result<SignalResult> {
    let cfo = store.get_canonical("operating_cash_flow", year, company)?;
    let inputs = vec![input("operating_cash_flow", year, cfo)];
    Ok(signal("cfo_positive", cfo, cfo.map(|v| v > 0.0), inputs))
}

/// Signal 3: ROA improved year over year.
fn delta_roa_positive(store: &FactStore, company: &str, year: i32) -> Result<SignalResult> {
    delta_of_ratio_signal(
        store,
        company,
        year,
        "delta_roa_positive",
        "net_income",
        "total_assets",
        |d| d > 0.0,
    )
}

/// Signal 4: cash flow exceeds accounting income.
fn accruals_quality(store: &FactStore, company: &str, year: i32) -> Result<SignalResult> {
    let cfo = store.get_canonical("operating_cash_flow", year, company)?;
    let net_income = store.get_canonical("net_income", year, company)?;
    let assets = store.get_canonical("total_assets", year, company)?;

    let value = match (cfo, net_income, assets) {
        (Some(c), Some(n), Some(a)) if a != 0.0 => Some((c - n) / a),
        _ => None,
    };
    let inputs = vec![
        input("operating_cash_flow", year, cfo),
        input("net_income", year, net_income),
        input("total_assets", year, assets),
    ];
    Ok(signal("accruals_quality", value, value.map(|v| v > 0.0), inputs))
}

// === Leverage, liquidity, source of funds ===

/// Signal 5: leverage decreased year over year.
fn delta_leverage_negative(store: &FactStore, company: &str, year: i32) -> Result<SignalResult> {
    delta_of_ratio_signal(
        store,
        company,
        year,
        "delta_leverage_negative",
        "long_term_debt",
        "total_assets",
        |d| d < 0.0,
    )
}

/// Signal 6: current ratio increased year over year.
fn delta_liquidity_positive(store: &FactStore, company: &str, year: i32) -> Result<SignalResult> {
    delta_of_ratio_signal(
        store,
        company,
        year,
        "delta_liquidity_positive",
        "current_assets",
        "current_liabilities",
        |d| d > 0.0,
    )
}

/// Signal 7: shares outstanding did not increase.
fn no_equity_issuance(store: &FactStore, company: &str, year: i32) -> Result<SignalResult> {
    let current = store.get_canonical("shares_outstanding", year, company)?;
    let prior = store.get_previous_year("shares_outstanding", year, company)?;

    let value = match (current, prior) {
        (Some(c), Some(p)) => Some(c - p),
        _ => None,
    };
    let inputs = vec![
        input("shares_outstanding", year, current),
        input("shares_outstanding", year - 1, prior),
    ];
    Ok(signal("no_equity_issuance", value, value.map(|v| v <= 0.0), inputs))
}

// === Operating efficiency ===

/// Signal 8: gross margin improved year over year. Gross profit is
/// reconstructed from cost of revenue when not reported directly.
fn delta_gross_margin_positive(store: &FactStore, company: &str, year: i32) -> Result<SignalResult> {
    let current = gross_margin(store, company, year)?;
    let prior = gross_margin(store, company, year - 1)?;

    let value = match (current, prior) {
        (Some(c), Some(p)) => Some(c - p),
        _ => None,
    };
    let inputs = vec![
        input("gross_margin", year, current),
        input("gross_margin", year - 1, prior),
    ];
    Ok(signal(
        "delta_gross_margin_positive",
        value,
        value.map(|v| v > 0.0),
        inputs,
    ))
}

/// Signal 9: asset turnover improved year over year.
fn delta_asset_turnover_positive(
    store: &FactStore,
    company: &str,
    year: i32,
) -> Result<SignalResult> {
    delta_of_ratio_signal(
        store,
        company,
        year,
        "delta_asset_turnover_positive",
        "revenue",
        "total_assets",
        |d| d > 0.0,
    )
}

// === Helpers ===

fn ratio(
    store: &FactStore,
    company: &str,
    numerator: &str,
    denominator: &str,
    year: i32,
) -> Result<(Option<f64>, Vec<ProvenanceInput>)> {
    let num = store.get_canonical(numerator, year, company)?;
    let den = store.get_canonical(denominator, year, company)?;
    let value = match (num, den) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    };
    Ok((
        value,
        vec![input(numerator, year, num), input(denominator, year, den)],
    ))
}

/// Year-over-year change of a ratio, scored by `good`.
fn delta_of_ratio_signal(
    store: &FactStore,
    company: &str,
    year: i32,
    name: &'static str,
    numerator: &str,
    denominator: &str,
    good: fn(f64) -> bool,
) -> Result<SignalResult> {
    let (current, _) = ratio(store, company, numerator, denominator, year)?;
    let (prior, _) = ratio(store, company, numerator, denominator, year - 1)?;

    let value = match (current, prior) {
        (Some(c), Some(p)) => Some(c - p),
        _ => None,
    };
    let name_base = format!("{}_over_{}", numerator, denominator);
    let inputs = vec![
        input(&name_base, year, current),
        input(&name_base, year - 1, prior),
    ];
    Ok(signal(name, value, value.map(good), inputs))
}

fn gross_margin(store: &FactStore, company: &str, year: i32) -> Result<Option<f64>> {
    let revenue = match store.get_canonical("revenue", year, company)? {
        Some(r) if r != 0.0 => r,
        _ => return Ok(None),
    };
    if let Some(gross_profit) = store.get_canonical("gross_profit", year, company)? {
        return Ok(Some(gross_profit / revenue));
    }
    if let Some(cost) = store.get_canonical("cost_of_revenue", year, company)? {
        return Ok(Some((revenue - cost) / revenue));
    }
    Ok(None)
}

fn signal(
    name: &'static str,
    value: Option<f64>,
    good: Option<bool>,
    inputs: Vec<ProvenanceInput>,
) -> SignalResult {
    SignalResult {
        name,
        score: good.map(|g| if g { 1 } else { 0 }),
        value,
        inputs,
    }
}

fn input(metric: &str, year: i32, value: Option<f64>) -> ProvenanceInput {
    ProvenanceInput {
        metric: metric.to_string(),
        year,
        value,
    }
}
