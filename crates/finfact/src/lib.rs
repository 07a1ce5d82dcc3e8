//! Canonical fact reduction and reasoning engine.
//!
//! Turns heterogeneous, duplicate-laden filing observations into one
//! trusted value per (company, year, metric), composes those into
//! derived metrics with explicit provenance, and answers financial
//! questions with a deterministic confidence score.
//!
//! Data flows one way: raw observations -> reducer -> fact store ->
//! {derived evaluator, trend/comparison analyzers} -> confidence scorer
//! -> answer. The intent classifier sits in front and picks the path.

pub mod answerer;
pub mod comparison;
pub mod confidence;
pub mod derived;
pub mod fscore;
pub mod intent;
pub mod reducer;
pub mod store;
pub mod trend;

pub use answerer::AnswerEngine;
pub use store::FactStore;
