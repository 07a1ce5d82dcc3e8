//! Deterministic intent classification over normalized question text.
//!
//! Ordered rule matching: comparison, then trend, then derived metric,
//! then single value. Rules are plain keyword checks so each class is
//! unit-testable without entity extraction; extraction runs alongside
//! and leaves unresolvable slots empty rather than guessing.

use crate::derived;
use finfact_common::mappings::lookup_metric_phrase;
use finfact_common::types::{ClassifiedQuestion, IntentKind, QuestionEntities};
use finfact_common::EngineConfig;
use once_cell::sync::Lazy;
use regex::Regex;

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());

/// Known company names plus lookup aliases, lower-cased.
#[derive(Debug, Clone, Default)]
pub struct CompanyRegistry {
    /// (alias lower-cased, canonical name)
    entries: Vec<(String, String)>,
}

impl CompanyRegistry {
    /// Build from canonical company names. Each name registers itself
    /// plus a short alias with trailing legal suffixes stripped, so
    /// "apple" still resolves to "Apple Inc".
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::default();
        for name in names {
            registry.add(name.as_ref());
        }
        registry
    }

    pub fn add(&mut self, name: &str) {
        let lower = name.to_lowercase();
        self.push_entry(lower.clone(), name);

        let stripped = strip_legal_suffix(&lower);
        if stripped != lower && !stripped.is_empty() {
            self.push_entry(stripped, name);
        }
    }

    pub fn add_alias(&mut self, alias: &str, canonical: &str) {
        self.push_entry(alias.to_lowercase(), canonical);
    }

    fn push_entry(&mut self, alias: String, canonical: &str) {
        if !self.entries.iter().any(|(a, _)| *a == alias) {
            self.entries.push((alias, canonical.to_string()));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Companies mentioned in the question. When one matching alias is a
    /// substring of another ("apple" vs "apple inc"), the longest match
    /// wins.
    pub fn extract(&self, question_lower: &str) -> Vec<String> {
        let mut matched: Vec<&(String, String)> = self
            .entries
            .iter()
            .filter(|(alias, _)| question_lower.contains(alias.as_str()))
            .collect();
        matched.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut companies: Vec<String> = Vec::new();
        let mut kept_aliases: Vec<&str> = Vec::new();
        for (alias, canonical) in matched {
            if kept_aliases.iter().any(|kept| kept.contains(alias.as_str())) {
                continue;
            }
            if !companies.contains(canonical) {
                companies.push(canonical.clone());
                kept_aliases.push(alias);
            }
        }
        companies
    }
}

fn strip_legal_suffix(name_lower: &str) -> String {
    const SUFFIXES: &[&str] = &[
        " incorporated",
        " corporation",
        " company",
        " holdings",
        " corp.",
        " corp",
        " inc.",
        " inc",
        " ltd.",
        " ltd",
        " plc",
        " co.",
        " co",
    ];
    for suffix in SUFFIXES {
        if let Some(stripped) = name_lower.strip_suffix(suffix) {
            return stripped.trim().to_string();
        }
    }
    name_lower.to_string()
}

/// Classify a question and extract its entities.
pub fn classify(
    question: &str,
    registry: &CompanyRegistry,
    config: &EngineConfig,
) -> ClassifiedQuestion {
    let q = question.to_lowercase();

    let companies = registry.extract(&q);
    let metric = lookup_metric_phrase(&q).map(|m| m.to_string());
    let years = extract_years(&q, config);

    let kind = classify_text(&q, companies.len(), metric.as_deref());

    ClassifiedQuestion {
        kind,
        entities: QuestionEntities {
            companies,
            metric,
            years,
        },
    }
}

/// Ordered rule list, evaluated in fixed priority order.
fn classify_text(q: &str, company_count: usize, metric: Option<&str>) -> IntentKind {
    // Comparison: multiple companies or explicit comparison vocabulary
    if company_count >= 2
        || q.contains("compare")
        || q.contains(" vs ")
        || q.contains(" vs. ")
        || q.contains("versus")
        || q.contains("higher")
        || q.contains("lower")
        || (q.contains("which") && q.contains("had"))
    {
        return IntentKind::Comparison;
    }

    // Trend: directional vocabulary over time
    if q.contains("trend")
        || q.contains("change")
        || q.contains("over time")
        || q.contains("grown")
        || q.contains("growing")
        || q.contains("declined")
        || q.contains("declining")
    {
        return IntentKind::Trend;
    }

    // Derived metric: name matches a spec, or derived vocabulary
    let metric_is_derived = metric.map(|m| derived::find_spec(m).is_some()).unwrap_or(false);
    if metric_is_derived
        || q.contains("margin")
        || q.contains("ratio")
        || q.contains("return on")
    {
        return IntentKind::DerivedMetric;
    }

    IntentKind::SingleValue
}

/// Four-digit years within the configured plausible range, in order of
/// appearance, deduplicated.
fn extract_years(q: &str, config: &EngineConfig) -> Vec<i32> {
    let range = config.year_range();
    let mut years = Vec::new();
    for m in YEAR_RE.find_iter(q) {
        if let Ok(year) = m.as_str().parse::<i32>() {
            if range.contains(&year) && !years.contains(&year) {
                years.push(year);
            }
        }
    }
    years
}
