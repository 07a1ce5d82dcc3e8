//! Engine configuration.
//!
//! Loads settings from a TOML file or uses defaults. A missing or
//! unreadable config file is never fatal: the engine runs on defaults
//! and logs a warning, the same policy the ingestion side follows for
//! partially usable filings.

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the SQLite fact database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Lower bound of plausible fiscal years in question text.
    #[serde(default = "default_year_min")]
    pub year_min: i32,

    /// Upper bound slack beyond the current year (filings can reference
    /// the year in progress).
    #[serde(default = "default_year_max_slack")]
    pub year_max_slack: i32,

    /// Tolerance band around 365 days for a duration to count as a
    /// full-year reporting period.
    #[serde(default = "default_full_year_min_days")]
    pub full_year_min_days: i64,
    #[serde(default = "default_full_year_max_days")]
    pub full_year_max_days: i64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("finfact.db")
}

fn default_year_min() -> i32 {
    1990
}

fn default_year_max_slack() -> i32 {
    1
}

fn default_full_year_min_days() -> i64 {
    350
}

fn default_full_year_max_days() -> i64 {
    380
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            year_min: default_year_min(),
            year_max_slack: default_year_max_slack(),
            full_year_min_days: default_full_year_min_days(),
            full_year_max_days: default_full_year_max_days(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, falling back to defaults on any failure.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Config load failed ({e}), using defaults");
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Plausible fiscal-year range for entity extraction.
    pub fn year_range(&self) -> RangeInclusive<i32> {
        self.year_min..=(Utc::now().year() + self.year_max_slack)
    }

    /// Whether a duration of `days` counts as a full reporting year.
    pub fn is_full_year(&self, days: i64) -> bool {
        (self.full_year_min_days..=self.full_year_max_days).contains(&days)
    }
}
