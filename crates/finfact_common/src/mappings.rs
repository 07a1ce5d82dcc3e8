//! Concept-to-metric mapping and the metric phrase vocabulary.
//!
//! The concept map mirrors the standardized filing tags the ingestion
//! layer reports. Unmapped concepts are skipped (and counted) during
//! reduction, so extending this table plus a backfill pass is enough to
//! promote a new metric without re-ingesting filings.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Standardized concept local name -> canonical metric name.
pub static CONCEPT_METRIC_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // Income statement
    m.insert("Revenues", "revenue");
    m.insert("RevenueFromContractWithCustomerExcludingAssessedTax", "revenue");
    m.insert("NetIncomeLoss", "net_income");
    m.insert("OperatingIncomeLoss", "operating_income");
    m.insert("GrossProfit", "gross_profit");
    m.insert("CostOfRevenue", "cost_of_revenue");

    // Balance sheet
    m.insert("Assets", "total_assets");
    m.insert("Liabilities", "total_liabilities");
    m.insert("StockholdersEquity", "total_equity");
    m.insert("AssetsCurrent", "current_assets");
    m.insert("LiabilitiesCurrent", "current_liabilities");
    m.insert("LongTermDebtNoncurrent", "long_term_debt");
    m.insert("CommonStockSharesOutstanding", "shares_outstanding");

    // Cash flow / derived support
    m.insert("NetCashProvidedByUsedInOperatingActivities", "operating_cash_flow");
    m.insert("EarningsBeforeInterestTaxesDepreciationAmortization", "ebitda");

    m
});

/// Phrase -> canonical or derived metric name, checked longest-first so
/// "net income" wins over "income" and "net margin" over "margin".
pub static METRIC_ALIASES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    let mut v: Vec<(&'static str, &'static str)> = vec![
        // Canonical metrics
        ("operating cash flow", "operating_cash_flow"),
        ("cash from operations", "operating_cash_flow"),
        ("operating income", "operating_income"),
        ("net income", "net_income"),
        ("gross profit", "gross_profit"),
        ("cost of revenue", "cost_of_revenue"),
        ("total assets", "total_assets"),
        ("total liabilities", "total_liabilities"),
        ("stockholders equity", "total_equity"),
        ("total equity", "total_equity"),
        ("current assets", "current_assets"),
        ("current liabilities", "current_liabilities"),
        ("long term debt", "long_term_debt"),
        ("shares outstanding", "shares_outstanding"),
        ("ebitda", "ebitda"),
        ("revenue", "revenue"),
        ("sales", "revenue"),
        ("earnings", "net_income"),
        ("profit", "net_income"),
        // Derived metrics
        ("net profit margin", "net_margin"),
        ("net margin", "net_margin"),
        ("profit margin", "net_margin"),
        ("gross margin", "gross_margin"),
        ("return on assets", "roa"),
        ("roa", "roa"),
        ("current ratio", "current_ratio"),
        ("asset turnover", "asset_turnover"),
        ("leverage", "leverage"),
        ("debt to assets", "leverage"),
        ("accrual ratio", "accrual_ratio"),
        // "change" is left to the trend classifier; only growth phrasing
        // maps to the delta metrics.
        ("revenue growth", "revenue_yoy_delta"),
        ("net income growth", "net_income_yoy_delta"),
        ("piotroski", "piotroski_f_score"),
        ("f-score", "piotroski_f_score"),
        ("f score", "piotroski_f_score"),
    ];
    // Longest phrase first so substring aliases cannot shadow longer ones.
    v.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    v
});

/// Resolve a metric name or phrase appearing in question text.
pub fn lookup_metric_phrase(text_lower: &str) -> Option<&'static str> {
    for &(phrase, metric) in METRIC_ALIASES.iter() {
        if text_lower.contains(phrase) {
            return Some(metric);
        }
    }
    // Underscored canonical names pass through directly.
    for &(_, metric) in METRIC_ALIASES.iter() {
        if metric.contains('_') && text_lower.contains(metric) {
            return Some(metric);
        }
    }
    None
}
