//! Deterministic confidence scoring from concrete computation signals.
//!
//! Base confidence 1.0, additive deductions, floor 0.2. Deductions are
//! independent of each other and of application order. The explanation
//! is templated purely from the computation path; rebuilding it from the
//! same path always yields the same text.

use finfact_common::types::{ConfidenceLabel, IntentKind};

pub const AGGREGATION_DEDUCTION: f64 = 0.1;
pub const DERIVED_DEDUCTION: f64 = 0.3;
pub const FALLBACK_DEDUCTION: f64 = 0.4;
pub const CONFIDENCE_FLOOR: f64 = 0.2;

/// Everything the scorer and explainer need about how an answer was
/// produced. No hidden state: two identical paths score and explain
/// identically.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputationPath {
    pub kind: IntentKind,
    pub companies: Vec<String>,
    pub metric: Option<String>,
    pub years: Vec<i32>,
    /// Canonical reduction picked among more than one raw observation.
    pub aggregated: bool,
    /// A ratio/delta/composite computation was involved.
    pub derived: bool,
    /// A required component was absent and substituted via a fallback.
    pub fallback: bool,
}

impl ComputationPath {
    pub fn new(kind: IntentKind) -> Self {
        Self {
            kind,
            companies: Vec::new(),
            metric: None,
            years: Vec::new(),
            aggregated: false,
            derived: false,
            fallback: false,
        }
    }
}

/// Score a computation path. Always within [0.2, 1.0].
pub fn score(path: &ComputationPath) -> f64 {
    let mut confidence = 1.0;
    if path.aggregated {
        confidence -= AGGREGATION_DEDUCTION;
    }
    if path.derived {
        confidence -= DERIVED_DEDUCTION;
    }
    if path.fallback {
        confidence -= FALLBACK_DEDUCTION;
    }
    confidence.max(CONFIDENCE_FLOOR)
}

pub fn label(path: &ComputationPath) -> ConfidenceLabel {
    ConfidenceLabel::from_score(score(path))
}

/// Human-readable rationale: what was consulted and which deductions
/// applied.
pub fn explain(path: &ComputationPath) -> String {
    let mut parts: Vec<String> = Vec::new();

    let what = match &path.metric {
        Some(metric) => format!("{} answer for {}", path.kind, metric),
        None => format!("{} answer", path.kind),
    };
    parts.push(what);

    if !path.companies.is_empty() {
        parts.push(format!("companies consulted: {}", path.companies.join(", ")));
    }
    if !path.years.is_empty() {
        let years: Vec<String> = path.years.iter().map(|y| y.to_string()).collect();
        parts.push(format!("fiscal years: {}", years.join(", ")));
    }

    let mut deductions: Vec<String> = Vec::new();
    if path.aggregated {
        deductions.push(format!(
            "-{:.1} canonical value chosen among multiple observations",
            AGGREGATION_DEDUCTION
        ));
    }
    if path.derived {
        deductions.push(format!("-{:.1} derived-metric computation", DERIVED_DEDUCTION));
    }
    if path.fallback {
        deductions.push(format!("-{:.1} fallback substitution", FALLBACK_DEDUCTION));
    }
    if deductions.is_empty() {
        parts.push("direct canonical lookup, no deductions".to_string());
    } else {
        parts.push(format!("deductions: {}", deductions.join("; ")));
    }

    parts.push(format!("confidence {:.2} ({})", score(path), label(path).as_str()));
    parts.join(". ")
}
