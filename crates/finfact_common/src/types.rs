//! Core data model: raw observations, canonical facts, derived metrics,
//! questions and answers.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reporting period of a raw observation.
///
/// Balance-sheet facts are reported at an instant; flow facts cover a
/// duration. The fiscal year is inferred from the end of the period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "period_type", rename_all = "lowercase")]
pub enum Period {
    Instant { date: NaiveDate },
    Duration { start: NaiveDate, end: NaiveDate },
}

impl Period {
    /// Fiscal year inferred from the period end (or instant) date.
    pub fn fiscal_year(&self) -> i32 {
        match self {
            Period::Instant { date } => date.year(),
            Period::Duration { end, .. } => end.year(),
        }
    }

    /// Length in days for duration periods, None for instants.
    pub fn duration_days(&self) -> Option<i64> {
        match self {
            Period::Instant { .. } => None,
            Period::Duration { start, end } => Some((*end - *start).num_days()),
        }
    }

    pub fn type_str(&self) -> &'static str {
        match self {
            Period::Instant { .. } => "instant",
            Period::Duration { .. } => "duration",
        }
    }
}

/// One raw fact observation handed over by the ingestion layer.
///
/// Immutable once recorded; many observations may describe the same
/// real-world quantity under different contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFactObservation {
    /// Namespace-qualified concept, e.g. "{http://fasb.org/us-gaap/2023}Revenues"
    pub concept_qname: String,
    /// Local concept name, e.g. "Revenues"
    pub concept_local_name: String,
    pub concept_namespace: Option<String>,
    pub value: f64,
    pub unit: Option<String>,
    pub period: Period,
    pub context_id: String,
    /// Dimensional qualifiers. Empty means consolidated (whole entity).
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    pub company: String,
    pub filing_source: Option<String>,
}

impl RawFactObservation {
    /// A context with no dimensional qualifiers represents the
    /// whole-entity value rather than a segment/scenario slice.
    pub fn is_consolidated(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn fiscal_year(&self) -> i32 {
        self.period.fiscal_year()
    }
}

/// Key of a canonical fact: one value per (company, year, metric).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactKey {
    pub company: String,
    pub year: i32,
    pub metric: String,
}

impl fmt::Display for FactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.company, self.year, self.metric)
    }
}

/// The single trusted value chosen to represent a (company, year, metric)
/// after reduction. Never hand-edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFact {
    pub company: String,
    pub year: i32,
    pub metric: String,
    pub value: f64,
    /// How many raw observations competed for this key during reduction.
    /// >1 means the magnitude tie-break picked among candidates.
    #[serde(default = "default_source_count")]
    pub source_count: i64,
}

fn default_source_count() -> i64 {
    1
}

impl CanonicalFact {
    pub fn key(&self) -> FactKey {
        FactKey {
            company: self.company.clone(),
            year: self.year,
            metric: self.metric.clone(),
        }
    }
}

/// Kind of a derived metric computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedMetricKind {
    Ratio,
    Delta,
    Composite,
}

impl DerivedMetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedMetricKind::Ratio => "ratio",
            DerivedMetricKind::Delta => "delta",
            DerivedMetricKind::Composite => "composite",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "delta" => DerivedMetricKind::Delta,
            "composite" => DerivedMetricKind::Composite,
            _ => DerivedMetricKind::Ratio,
        }
    }
}

/// One input consulted by a derived computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceInput {
    pub metric: String,
    pub year: i32,
    pub value: Option<f64>,
}

/// Exact inputs a derived computation consulted. Stored alongside the
/// result; reconstructing the explanation needs nothing else.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub inputs: Vec<ProvenanceInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// True when a substitute input path was used (e.g. gross profit
    /// reconstructed from revenue minus cost of revenue).
    #[serde(default)]
    pub fallback_used: bool,
}

/// Result of evaluating a derived metric. Absence is an explicit,
/// storable outcome, never inferred implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetricResult {
    pub company: String,
    pub year: i32,
    pub metric: String,
    pub value: Option<f64>,
    pub kind: DerivedMetricKind,
    pub provenance: Provenance,
}

/// Question intent, evaluated in fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Comparison,
    Trend,
    DerivedMetric,
    SingleValue,
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntentKind::Comparison => "comparison",
            IntentKind::Trend => "trend",
            IntentKind::DerivedMetric => "derived_metric",
            IntentKind::SingleValue => "single_value",
        };
        write!(f, "{}", s)
    }
}

/// Entities extracted from a question. Unresolvable slots stay empty;
/// downstream treats an empty required slot as a hard failure for that
/// question, never a guess.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionEntities {
    pub companies: Vec<String>,
    pub metric: Option<String>,
    pub years: Vec<i32>,
}

/// A classified question: intent plus extracted entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedQuestion {
    pub kind: IntentKind,
    pub entities: QuestionEntities,
}

/// Directional label for a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    Increasing,
    Decreasing,
    Mixed,
    /// Fewer than two resolvable points. Distinct from Mixed.
    InsufficientData,
}

impl TrendLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendLabel::Increasing => "increasing",
            TrendLabel::Decreasing => "decreasing",
            TrendLabel::Mixed => "mixed",
            TrendLabel::InsufficientData => "insufficient_data",
        }
    }
}

/// A company paired with its resolved value, used for ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedValue {
    pub company: String,
    pub value: f64,
}

/// Outcome of a multi-company comparison. Companies with absent values
/// are listed in `missing`, never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Winner {
        winner: RankedValue,
        loser: RankedValue,
        ranked: Vec<RankedValue>,
        missing: Vec<String>,
    },
    /// Equal top values are an explicit tie, not an arbitrary pick.
    Tie {
        companies: Vec<String>,
        value: f64,
        ranked: Vec<RankedValue>,
        missing: Vec<String>,
    },
    InsufficientData {
        ranked: Vec<RankedValue>,
        missing: Vec<String>,
    },
}

/// Bucketed confidence tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

impl ConfidenceLabel {
    /// Thresholds: >= 0.8 high, >= 0.5 medium, else low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceLabel::High
        } else if score >= 0.5 {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLabel::High => "high",
            ConfidenceLabel::Medium => "medium",
            ConfidenceLabel::Low => "low",
        }
    }
}

/// Final answer payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerValue {
    Scalar { value: f64 },
    Trend { label: TrendLabel, series: Vec<(i32, Option<f64>)> },
    Comparison { result: ComparisonOutcome },
    NoAnswer { reason: String },
}

/// Confidence-scored, explained answer to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub value: AnswerValue,
    /// Always within [0.2, 1.0]; a returned answer carries residual trust.
    pub confidence: f64,
    pub label: ConfidenceLabel,
    pub explanation: String,
}

/// Free-text heuristic accumulated from past feedback. Append-only,
/// consulted but never required for correctness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookRule {
    pub id: i64,
    pub rule: String,
}
