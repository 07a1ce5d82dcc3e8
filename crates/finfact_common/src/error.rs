//! Engine error taxonomy.
//!
//! Only structural problems (upstream contract violations) are errors.
//! Unresolved entities, missing canonical data and degenerate arithmetic
//! are modeled as explicit absent values that flow to the confidence
//! scorer, never as exceptions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input shape (e.g. an observation with no concept id).
    /// The only class that halts processing.
    #[error("structural error: {0}")]
    Structural(String),
}

impl EngineError {
    pub fn structural(msg: impl Into<String>) -> Self {
        EngineError::Structural(msg.into())
    }
}
