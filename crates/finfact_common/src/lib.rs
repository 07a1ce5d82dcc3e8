//! Shared data model for the finfact engine.
//!
//! Types, error taxonomy, concept mappings and configuration used by the
//! reduction and reasoning pipeline. No business logic lives here.

pub mod config;
pub mod error;
pub mod mappings;
pub mod types;

pub use config::EngineConfig;
pub use error::EngineError;
