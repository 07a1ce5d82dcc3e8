//! Question answering: classify -> retrieve/compute -> score -> explain.
//!
//! Unresolved entities and missing canonical data never raise; they
//! become explicit no-answer responses carrying the floor confidence.
//! Playbook rules, when any match the question, are appended to the
//! explanation as hints; an empty playbook changes nothing.

use crate::comparison;
use crate::confidence::{self, ComputationPath, CONFIDENCE_FLOOR};
use crate::derived;
use crate::intent::{self, CompanyRegistry};
use crate::store::FactStore;
use crate::trend;
use anyhow::Result;
use finfact_common::types::{
    Answer, AnswerValue, ClassifiedQuestion, ComparisonOutcome, ConfidenceLabel,
    DerivedMetricResult, IntentKind, TrendLabel,
};
use finfact_common::EngineConfig;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// The reasoning engine's public surface. Holds an explicit store
/// handle; nothing here is global.
pub struct AnswerEngine {
    store: FactStore,
    config: EngineConfig,
    registry: CompanyRegistry,
}

impl AnswerEngine {
    /// Build an engine over a store; the company registry is seeded from
    /// the canonical facts already committed.
    pub fn new(store: FactStore, config: EngineConfig) -> Result<Self> {
        let registry = CompanyRegistry::from_names(store.available_companies()?);
        Ok(Self {
            store,
            config,
            registry,
        })
    }

    /// Re-seed the registry after new canonical facts were committed.
    pub fn refresh_registry(&mut self) -> Result<()> {
        self.registry = CompanyRegistry::from_names(self.store.available_companies()?);
        Ok(())
    }

    /// Register an extra lookup alias for a known company.
    pub fn add_company_alias(&mut self, alias: &str, canonical: &str) {
        self.registry.add_alias(alias, canonical);
    }

    pub fn store(&self) -> &FactStore {
        &self.store
    }

    // === Typed accessors exposed to callers ===

    pub fn get_canonical_fact(&self, metric: &str, year: i32, company: &str) -> Result<Option<f64>> {
        self.store.get_canonical(metric, year, company)
    }

    pub fn get_canonical_timeseries(
        &self,
        company: &str,
        metric: &str,
        years: &[i32],
    ) -> Result<Vec<(i32, Option<f64>)>> {
        self.store.get_timeseries(company, metric, years)
    }

    pub fn get_available_companies(&self) -> Result<BTreeSet<String>> {
        self.store.available_companies()
    }

    /// Canonical metrics present in the store plus the built-in derived
    /// metric names.
    pub fn get_available_metrics(&self) -> Result<BTreeSet<String>> {
        let mut metrics = self.store.available_metrics()?;
        for spec in derived::BUILTIN_SPECS {
            metrics.insert(spec.name.to_string());
        }
        Ok(metrics)
    }

    // === Question answering ===

    pub fn answer_question(&self, question: &str) -> Result<Answer> {
        let classified = intent::classify(question, &self.registry, &self.config);
        debug!(
            "Classified question as {} (companies={:?}, metric={:?}, years={:?})",
            classified.kind,
            classified.entities.companies,
            classified.entities.metric,
            classified.entities.years
        );

        let answer = match classified.kind {
            IntentKind::SingleValue => self.answer_single_value(&classified)?,
            IntentKind::DerivedMetric => self.answer_derived(&classified)?,
            IntentKind::Trend => self.answer_trend(&classified)?,
            IntentKind::Comparison => self.answer_comparison(&classified)?,
        };

        let answer = self.append_playbook_hints(question, answer)?;
        info!(
            "Answered question with confidence {:.2} ({})",
            answer.confidence,
            answer.label.as_str()
        );
        Ok(answer)
    }

    fn answer_single_value(&self, classified: &ClassifiedQuestion) -> Result<Answer> {
        let entities = &classified.entities;
        let (company, metric, year) = match (
            entities.companies.first(),
            entities.metric.as_deref(),
            entities.years.first(),
        ) {
            (Some(c), Some(m), Some(y)) => (c.clone(), m.to_string(), *y),
            _ => return Ok(no_answer(classified, "could not resolve company, metric and year")),
        };

        let mut path = ComputationPath::new(IntentKind::SingleValue);
        path.companies.push(company.clone());
        path.metric = Some(metric.clone());
        path.years.push(year);

        match self.store.get_canonical_with_count(&metric, year, &company)? {
            Some((value, count)) => {
                path.aggregated = count > 1;
                Ok(build_answer(AnswerValue::Scalar { value }, &path))
            }
            // Metrics outside the canonical vocabulary (e.g. a stored
            // F-Score) live in derived_metrics; serve them from there.
            None => match self.store.get_derived_record(&metric, year, &company)? {
                Some(record) => {
                    path.derived = true;
                    path.fallback = record.provenance.fallback_used;
                    match record.value {
                        Some(value) => Ok(build_answer(AnswerValue::Scalar { value }, &path)),
                        None => Ok(insufficient_data(&path)),
                    }
                }
                None => Ok(insufficient_data(&path)),
            },
        }
    }

    fn answer_derived(&self, classified: &ClassifiedQuestion) -> Result<Answer> {
        let entities = &classified.entities;
        let (company, metric, year) = match (
            entities.companies.first(),
            entities.metric.as_deref(),
            entities.years.first(),
        ) {
            (Some(c), Some(m), Some(y)) => (c.clone(), m.to_string(), *y),
            _ => return Ok(no_answer(classified, "could not resolve company, metric and year")),
        };

        let spec = match derived::find_spec(&metric) {
            Some(spec) => spec,
            // Derived vocabulary matched but the metric itself is
            // canonical; answer it as a single value.
            None => return self.answer_single_value(classified),
        };

        let mut path = ComputationPath::new(IntentKind::DerivedMetric);
        path.companies.push(company.clone());
        path.metric = Some(metric.clone());
        path.years.push(year);
        path.derived = true;

        let result = derived::evaluate_and_store(&self.store, spec, &company, year)?;
        path.fallback = result.provenance.fallback_used;
        path.aggregated = self.any_input_aggregated(&result, &company)?;

        match result.value {
            Some(value) => Ok(build_answer(AnswerValue::Scalar { value }, &path)),
            None => Ok(insufficient_data(&path)),
        }
    }

    fn answer_trend(&self, classified: &ClassifiedQuestion) -> Result<Answer> {
        let entities = &classified.entities;
        let (company, metric) = match (entities.companies.first(), entities.metric.as_deref()) {
            (Some(c), Some(m)) => (c.clone(), m.to_string()),
            _ => return Ok(no_answer(classified, "could not resolve company and metric")),
        };

        // Derived metrics have no canonical rows; their series is
        // evaluated per year instead of fetched.
        let spec = derived::find_spec(&metric);

        // A trend needs at least two years; fall back to every year the
        // store has when the question names fewer. Named years span an
        // inclusive range so intermediate years without a value count as
        // gaps.
        let years: Vec<i32> = match (entities.years.iter().min(), entities.years.iter().max()) {
            (Some(&min), Some(&max)) if min < max => (min..=max).collect(),
            _ => match spec {
                Some(_) => self.store.years_for_company(&company)?,
                None => self.store.years_for(&company, &metric)?,
            },
        };

        let mut path = ComputationPath::new(IntentKind::Trend);
        path.companies.push(company.clone());
        path.metric = Some(metric.clone());
        path.years = years.clone();
        path.derived = spec.is_some();

        if years.is_empty() {
            return Ok(insufficient_data(&path));
        }

        let analysis = match spec {
            Some(spec) => trend::analyze_derived(&self.store, spec, &company, &years)?,
            None => trend::analyze(&self.store, &company, &metric, &years)?,
        };
        // Requested years without a resolvable value weaken the series
        path.fallback = analysis.has_gaps();
        if spec.is_none() {
            path.aggregated = self.any_year_aggregated(&metric, &years, &company)?;
        }

        if analysis.label == TrendLabel::InsufficientData {
            let mut answer = insufficient_data(&path);
            answer.value = AnswerValue::Trend {
                label: analysis.label,
                series: analysis.series,
            };
            return Ok(answer);
        }

        Ok(build_answer(
            AnswerValue::Trend {
                label: analysis.label,
                series: analysis.series,
            },
            &path,
        ))
    }

    fn answer_comparison(&self, classified: &ClassifiedQuestion) -> Result<Answer> {
        let entities = &classified.entities;
        let (metric, year) = match (entities.metric.as_deref(), entities.years.first()) {
            (Some(m), Some(y)) => (m.to_string(), *y),
            _ => return Ok(no_answer(classified, "could not resolve metric and year")),
        };
        if entities.companies.len() < 2 {
            return Ok(no_answer(classified, "fewer than two recognized companies"));
        }

        let mut path = ComputationPath::new(IntentKind::Comparison);
        path.companies = entities.companies.clone();
        path.metric = Some(metric.clone());
        path.years.push(year);

        let (outcome, signals) =
            comparison::compare_companies(&self.store, &entities.companies, &metric, year)?;
        path.derived = signals.derived_used;
        path.aggregated = signals.aggregated;
        // Companies excluded for missing data weaken the ranking
        path.fallback = match &outcome {
            ComparisonOutcome::Winner { missing, .. }
            | ComparisonOutcome::Tie { missing, .. }
            | ComparisonOutcome::InsufficientData { missing, .. } => !missing.is_empty(),
        };

        if matches!(outcome, ComparisonOutcome::InsufficientData { .. }) {
            let mut answer = insufficient_data(&path);
            answer.value = AnswerValue::Comparison { result: outcome };
            return Ok(answer);
        }

        Ok(build_answer(AnswerValue::Comparison { result: outcome }, &path))
    }

    /// True when any canonical input consulted by a derived computation
    /// was itself reduced from multiple observations.
    fn any_input_aggregated(&self, result: &DerivedMetricResult, company: &str) -> Result<bool> {
        for input in &result.provenance.inputs {
            if let Some((_, count)) =
                self.store
                    .get_canonical_with_count(&input.metric, input.year, company)?
            {
                if count > 1 {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn any_year_aggregated(&self, metric: &str, years: &[i32], company: &str) -> Result<bool> {
        for &year in years {
            if let Some((_, count)) = self.store.get_canonical_with_count(metric, year, company)? {
                if count > 1 {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Append matching playbook heuristics to the explanation. A rule
    /// matches when it shares a meaningful token with the question.
    fn append_playbook_hints(&self, question: &str, mut answer: Answer) -> Result<Answer> {
        let rules = self.store.playbook_rules()?;
        if rules.is_empty() {
            return Ok(answer);
        }

        let q = question.to_lowercase();
        let question_tokens: BTreeSet<&str> = q
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 4)
            .collect();

        let hints: Vec<String> = rules
            .iter()
            .filter(|r| {
                r.rule
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|t| t.len() >= 4 && question_tokens.contains(t))
            })
            .take(2)
            .map(|r| r.rule.clone())
            .collect();

        if !hints.is_empty() {
            answer.explanation = format!("{} Heuristics applied: {}", answer.explanation, hints.join(" "));
        }
        Ok(answer)
    }
}

fn build_answer(value: AnswerValue, path: &ComputationPath) -> Answer {
    let score = confidence::score(path);
    Answer {
        value,
        confidence: score,
        label: ConfidenceLabel::from_score(score),
        explanation: confidence::explain(path),
    }
}

/// Explicit refusal for unresolvable questions: floor confidence, never
/// a guess.
fn no_answer(classified: &ClassifiedQuestion, reason: &str) -> Answer {
    Answer {
        value: AnswerValue::NoAnswer {
            reason: reason.to_string(),
        },
        confidence: CONFIDENCE_FLOOR,
        label: ConfidenceLabel::Low,
        explanation: format!(
            "Could not answer {} question: {}. No value was guessed.",
            classified.kind, reason
        ),
    }
}

/// Required data absent after a fully resolved question.
fn insufficient_data(path: &ComputationPath) -> Answer {
    Answer {
        value: AnswerValue::NoAnswer {
            reason: "insufficient data".to_string(),
        },
        confidence: CONFIDENCE_FLOOR,
        label: ConfidenceLabel::Low,
        explanation: format!("{} Insufficient data for a reliable answer.", confidence::explain(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finfact_common::types::CanonicalFact;

    fn engine_with(facts: &[(&str, i32, &str, f64)]) -> AnswerEngine {
        let store = FactStore::open_in_memory().unwrap();
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
        AnswerEngine::new(store, EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_single_value_full_confidence() {
        let engine = engine_with(&[("Acme Corp", 2023, "revenue", 1_000_000.0)]);
        let answer = engine.answer_question("What was Acme Corp revenue in 2023?").unwrap();
        assert_eq!(answer.value, AnswerValue::Scalar { value: 1_000_000.0 });
        assert_eq!(answer.confidence, 1.0);
        assert_eq!(answer.label, ConfidenceLabel::High);
    }

    #[test]
    fn test_unresolved_company_is_no_answer() {
        let engine = engine_with(&[("Acme Corp", 2023, "revenue", 1_000_000.0)]);
        let answer = engine
            .answer_question("What was Nonexistent Industries revenue in 2023?")
            .unwrap();
        assert!(matches!(answer.value, AnswerValue::NoAnswer { .. }));
        assert_eq!(answer.confidence, CONFIDENCE_FLOOR);
        assert_eq!(answer.label, ConfidenceLabel::Low);
    }

    #[test]
    fn test_available_metrics_include_derived() {
        let engine = engine_with(&[("Acme Corp", 2023, "revenue", 1.0)]);
        let metrics = engine.get_available_metrics().unwrap();
        assert!(metrics.contains("revenue"));
        assert!(metrics.contains("net_margin"));
        assert!(metrics.contains("roa"));
    }

    #[test]
    fn test_playbook_hint_appended_when_token_matches() {
        let engine = engine_with(&[("Acme Corp", 2023, "revenue", 5.0)]);
        engine
            .store()
            .append_playbook_rule("Verify revenue against note disclosures.")
            .unwrap();
        engine.store().append_playbook_rule("Unrelated rule.").unwrap();

        let answer = engine.answer_question("What was Acme Corp revenue in 2023?").unwrap();
        assert!(answer.explanation.contains("note disclosures"));
        assert!(!answer.explanation.contains("Unrelated"));
    }

    #[test]
    fn test_empty_playbook_degrades_gracefully() {
        let engine = engine_with(&[("Acme Corp", 2023, "revenue", 5.0)]);
        let answer = engine.answer_question("What was Acme Corp revenue in 2023?").unwrap();
        assert!(!answer.explanation.contains("Heuristics"));
    }
}
