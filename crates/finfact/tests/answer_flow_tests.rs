//! End-to-end answer flow: seeded store, natural-language question,
//! answer with confidence and explanation.

use approx::assert_relative_eq;
use finfact::confidence::CONFIDENCE_FLOOR;
use finfact::fscore;
use finfact::{AnswerEngine, FactStore};
use finfact_common::types::{
    AnswerValue, CanonicalFact, ComparisonOutcome, ConfidenceLabel, TrendLabel,
};
use finfact_common::EngineConfig;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

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

fn engine(facts: &[(&str, i32, &str, f64)]) -> AnswerEngine {
    init_logging();
    let store = FactStore::open_in_memory().unwrap();
    seed(&store, facts);
    AnswerEngine::new(store, EngineConfig::default()).unwrap()
}

#[test]
fn derived_metric_answer_carries_medium_confidence() {
    let engine = engine(&[
        ("Acme Corp", 2023, "revenue", 200.0),
        ("Acme Corp", 2023, "net_income", 20.0),
    ]);

    let answer = engine
        .answer_question("What is Acme Corp's net margin for 2023?")
        .unwrap();

    match answer.value {
        AnswerValue::Scalar { value } => assert_relative_eq!(value, 0.10),
        other => panic!("expected scalar, got {:?}", other),
    }
    assert_relative_eq!(answer.confidence, 0.7);
    assert_eq!(answer.label, ConfidenceLabel::Medium);
    assert!(answer.explanation.contains("net_margin"));
    assert!(answer.explanation.contains("derived"));

    // The computation was persisted with its provenance
    let record = engine
        .store()
        .get_derived_record("net_margin", 2023, "Acme Corp")
        .unwrap()
        .unwrap();
    assert_eq!(record.value, Some(0.10));
    assert_eq!(record.provenance.inputs.len(), 2);
}

#[test]
fn derived_metric_with_missing_input_refuses() {
    let engine = engine(&[("Acme Corp", 2023, "net_income", 20.0)]);

    let answer = engine
        .answer_question("What is Acme Corp's net margin for 2023?")
        .unwrap();
    assert!(matches!(answer.value, AnswerValue::NoAnswer { .. }));
    assert_relative_eq!(answer.confidence, CONFIDENCE_FLOOR);
    assert_eq!(answer.label, ConfidenceLabel::Low);
    assert!(answer.explanation.contains("Insufficient data"));

    // The absent result is persisted too
    let record = engine
        .store()
        .get_derived_record("net_margin", 2023, "Acme Corp")
        .unwrap()
        .unwrap();
    assert_eq!(record.value, None);
}

#[test]
fn trend_answer_over_named_years() {
    let engine = engine(&[
        ("Acme Corp", 2021, "revenue", 100.0),
        ("Acme Corp", 2022, "revenue", 120.0),
        ("Acme Corp", 2023, "revenue", 150.0),
    ]);

    let answer = engine
        .answer_question("How did Acme Corp revenue change from 2021 to 2023?")
        .unwrap();
    match answer.value {
        AnswerValue::Trend { label, series } => {
            assert_eq!(label, TrendLabel::Increasing);
            assert_eq!(series.len(), 3);
        }
        other => panic!("expected trend, got {:?}", other),
    }
    assert_relative_eq!(answer.confidence, 1.0);
}

#[test]
fn trend_without_named_years_uses_stored_series() {
    let engine = engine(&[
        ("Acme Corp", 2021, "revenue", 150.0),
        ("Acme Corp", 2022, "revenue", 120.0),
        ("Acme Corp", 2023, "revenue", 100.0),
    ]);

    let answer = engine
        .answer_question("What is the trend in Acme Corp revenue?")
        .unwrap();
    match answer.value {
        AnswerValue::Trend { label, .. } => assert_eq!(label, TrendLabel::Decreasing),
        other => panic!("expected trend, got {:?}", other),
    }
}

#[test]
fn trend_gap_weakens_confidence() {
    let engine = engine(&[
        ("Acme Corp", 2021, "revenue", 100.0),
        ("Acme Corp", 2023, "revenue", 150.0),
    ]);

    let answer = engine
        .answer_question("How did Acme Corp revenue change from 2021 to 2023?")
        .unwrap();
    match answer.value {
        AnswerValue::Trend { label, series } => {
            assert_eq!(label, TrendLabel::Increasing);
            assert_eq!(series, vec![(2021, Some(100.0)), (2022, None), (2023, Some(150.0))]);
        }
        other => panic!("expected trend, got {:?}", other),
    }
    // 1.0 - 0.4 fallback for the gap
    assert_relative_eq!(answer.confidence, 0.6);
}

#[test]
fn stored_f_score_is_answerable() {
    let engine = engine(&[
        // 2022
        ("Acme Corp", 2022, "net_income", 100_000.0),
        ("Acme Corp", 2022, "total_assets", 2_000_000.0),
        ("Acme Corp", 2022, "operating_cash_flow", 150_000.0),
        ("Acme Corp", 2022, "long_term_debt", 400_000.0),
        ("Acme Corp", 2022, "current_assets", 400_000.0),
        ("Acme Corp", 2022, "current_liabilities", 250_000.0),
        ("Acme Corp", 2022, "shares_outstanding", 1_000_000.0),
        ("Acme Corp", 2022, "revenue", 1_000_000.0),
        ("Acme Corp", 2022, "gross_profit", 400_000.0),
        // 2023: better on every axis
        ("Acme Corp", 2023, "net_income", 150_000.0),
        ("Acme Corp", 2023, "total_assets", 2_100_000.0),
        ("Acme Corp", 2023, "operating_cash_flow", 200_000.0),
        ("Acme Corp", 2023, "long_term_debt", 350_000.0),
        ("Acme Corp", 2023, "current_assets", 500_000.0),
        ("Acme Corp", 2023, "current_liabilities", 250_000.0),
        ("Acme Corp", 2023, "shares_outstanding", 990_000.0),
        ("Acme Corp", 2023, "revenue", 1_200_000.0),
        ("Acme Corp", 2023, "gross_profit", 520_000.0),
    ]);
    fscore::compute_and_store(engine.store(), "Acme Corp", 2023).unwrap();

    let answer = engine
        .answer_question("What is Acme Corp's piotroski f score for 2023?")
        .unwrap();
    assert_eq!(answer.value, AnswerValue::Scalar { value: 9.0 });
    // Served from a derived computation, so the derived deduction applies
    assert_relative_eq!(answer.confidence, 0.7);
    assert_eq!(answer.label, ConfidenceLabel::Medium);
}

#[test]
fn derived_metric_trend_is_answerable() {
    // Margins 0.05, 0.08, 0.10 across three years
    let engine = engine(&[
        ("Acme Corp", 2021, "revenue", 1000.0),
        ("Acme Corp", 2021, "net_income", 50.0),
        ("Acme Corp", 2022, "revenue", 1000.0),
        ("Acme Corp", 2022, "net_income", 80.0),
        ("Acme Corp", 2023, "revenue", 1000.0),
        ("Acme Corp", 2023, "net_income", 100.0),
    ]);

    let answer = engine
        .answer_question("How has Acme Corp's net margin changed from 2021 to 2023?")
        .unwrap();
    match answer.value {
        AnswerValue::Trend { label, series } => {
            assert_eq!(label, TrendLabel::Increasing);
            assert_eq!(series.len(), 3);
            assert!(series.iter().all(|(_, v)| v.is_some()));
        }
        other => panic!("expected trend, got {:?}", other),
    }
    // Derived computation per year, no gaps
    assert_relative_eq!(answer.confidence, 0.7);
    assert_eq!(answer.label, ConfidenceLabel::Medium);
}

#[test]
fn comparison_names_winner_and_loser() {
    let engine = engine(&[
        ("Alpha Corp", 2023, "revenue", 200.0),
        ("Beta Corp", 2023, "revenue", 100.0),
    ]);

    let answer = engine
        .answer_question("Compare Alpha Corp and Beta Corp revenue in 2023")
        .unwrap();
    match answer.value {
        AnswerValue::Comparison {
            result: ComparisonOutcome::Winner { winner, loser, .. },
        } => {
            assert_eq!(winner.company, "Alpha Corp");
            assert_eq!(loser.company, "Beta Corp");
        }
        other => panic!("expected winner, got {:?}", other),
    }
    assert_relative_eq!(answer.confidence, 1.0);
}

#[test]
fn comparison_tie_is_explicit() {
    let engine = engine(&[
        ("Alpha Corp", 2023, "revenue", 100.0),
        ("Beta Corp", 2023, "revenue", 100.0),
    ]);

    let answer = engine
        .answer_question("Which had higher revenue in 2023, Alpha Corp or Beta Corp?")
        .unwrap();
    match answer.value {
        AnswerValue::Comparison {
            result: ComparisonOutcome::Tie { companies, value, .. },
        } => {
            assert_eq!(companies.len(), 2);
            assert_eq!(value, 100.0);
        }
        other => panic!("expected tie, got {:?}", other),
    }
}

#[test]
fn comparison_missing_company_weakens_confidence() {
    let engine = engine(&[
        ("Alpha Corp", 2023, "revenue", 200.0),
        ("Beta Corp", 2023, "revenue", 100.0),
        ("Gamma Corp", 2022, "revenue", 50.0), // no 2023 value
    ]);

    let answer = engine
        .answer_question("Compare Alpha Corp and Beta Corp and Gamma Corp revenue in 2023")
        .unwrap();
    match &answer.value {
        AnswerValue::Comparison {
            result: ComparisonOutcome::Winner { missing, .. },
        } => {
            assert_eq!(missing, &vec!["Gamma Corp".to_string()]);
        }
        other => panic!("expected winner, got {:?}", other),
    }
    // 1.0 - 0.4 for the excluded company
    assert_relative_eq!(answer.confidence, 0.6);
}

#[test]
fn aggregated_canonical_value_deducts() {
    let store = FactStore::open_in_memory().unwrap();
    store
        .put_canonical(&CanonicalFact {
            company: "Acme Corp".to_string(),
            year: 2023,
            metric: "revenue".to_string(),
            value: 1_200_000.0,
            source_count: 3,
        })
        .unwrap();
    let engine = AnswerEngine::new(store, EngineConfig::default()).unwrap();

    let answer = engine
        .answer_question("What was Acme Corp revenue in 2023?")
        .unwrap();
    assert_eq!(answer.value, AnswerValue::Scalar { value: 1_200_000.0 });
    assert_relative_eq!(answer.confidence, 0.9);
    assert_eq!(answer.label, ConfidenceLabel::High);
}

#[test]
fn company_alias_resolves_question() {
    let mut engine = engine(&[("International Business Machines", 2023, "revenue", 500.0)]);
    engine.add_company_alias("IBM", "International Business Machines");

    let answer = engine.answer_question("What was IBM revenue in 2023?").unwrap();
    assert_eq!(answer.value, AnswerValue::Scalar { value: 500.0 });
}

#[test]
fn answers_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("facts.db");

    {
        let store = FactStore::open(&db_path).unwrap();
        seed(
            &store,
            &[
                ("Acme Corp", 2023, "revenue", 200.0),
                ("Acme Corp", 2023, "net_income", 20.0),
            ],
        );
        let engine = AnswerEngine::new(store, EngineConfig::default()).unwrap();
        engine
            .answer_question("What is Acme Corp's net margin for 2023?")
            .unwrap();
    }

    let store = FactStore::open(&db_path).unwrap();
    assert_eq!(
        store.get_derived("net_margin", 2023, "Acme Corp").unwrap(),
        Some(0.10)
    );
    assert_eq!(
        store.get_canonical("revenue", 2023, "Acme Corp").unwrap(),
        Some(200.0)
    );
}
