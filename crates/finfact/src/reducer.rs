//! Canonical reduction: many raw observations -> one trusted value per
//! (company, year, metric).
//!
//! Selection keeps the observation with the greatest absolute magnitude,
//! ties broken by first-seen order. Known quality limitation: a
//! segment-level value larger than the consolidated one can win when
//! both survive filtering. That behavior is preserved deliberately; the
//! replacement policy (context-priority ranking) was never settled
//! upstream.

use finfact_common::error::EngineError;
use finfact_common::types::{CanonicalFact, FactKey, RawFactObservation};
use finfact_common::EngineConfig;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Filtering strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionMode {
    /// Full filtering: mapped concept, consolidated context, full-year
    /// period (instants pass; durations must sit in the tolerance band),
    /// optional requested-years filter.
    Strict,
    /// For locally supplied filings: only the concept-mapping and
    /// optional year filters apply.
    Permissive,
}

/// Per-filter skip counters, for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReductionStats {
    pub considered: usize,
    pub unmapped: usize,
    pub off_period: usize,
    pub non_consolidated: usize,
    pub off_year: usize,
    pub selected: usize,
}

impl ReductionStats {
    pub fn skipped(&self) -> usize {
        self.unmapped + self.off_period + self.non_consolidated + self.off_year
    }
}

/// Reduction output: one canonical fact per surviving key, plus counters.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionOutcome {
    pub facts: BTreeMap<FactKey, CanonicalFact>,
    pub stats: ReductionStats,
}

/// Reduce raw observations to canonical facts.
///
/// Individual records failing a filter are excluded and counted, never
/// an error. A structurally invalid observation (no concept id, no
/// company) violates the ingestion contract and is the one hard failure.
pub fn reduce(
    observations: &[RawFactObservation],
    concept_map: &HashMap<&str, &str>,
    requested_years: Option<&HashSet<i32>>,
    mode: ReductionMode,
    config: &EngineConfig,
) -> Result<ReductionOutcome, EngineError> {
    let mut stats = ReductionStats::default();
    let mut selected: BTreeMap<FactKey, CanonicalFact> = BTreeMap::new();

    for obs in observations {
        if obs.concept_local_name.trim().is_empty() {
            return Err(EngineError::structural(
                "raw observation missing concept identifier",
            ));
        }
        if obs.company.trim().is_empty() {
            return Err(EngineError::structural(
                "raw observation missing source company",
            ));
        }
        stats.considered += 1;

        let metric = match concept_map.get(obs.concept_local_name.as_str()) {
            Some(metric) => *metric,
            None => {
                stats.unmapped += 1;
                continue;
            }
        };

        if mode == ReductionMode::Strict {
            if !obs.is_consolidated() {
                stats.non_consolidated += 1;
                continue;
            }
            // Instant periods (balance sheet) always pass; durations must
            // cover a full reporting year.
            if let Some(days) = obs.period.duration_days() {
                if !config.is_full_year(days) {
                    stats.off_period += 1;
                    continue;
                }
            }
        }

        let year = obs.fiscal_year();
        if let Some(years) = requested_years {
            if !years.contains(&year) {
                stats.off_year += 1;
                continue;
            }
        }

        let key = FactKey {
            company: obs.company.clone(),
            year,
            metric: metric.to_string(),
        };
        match selected.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(CanonicalFact {
                    company: obs.company.clone(),
                    year,
                    metric: metric.to_string(),
                    value: obs.value,
                    source_count: 1,
                });
            }
            Entry::Occupied(mut entry) => {
                let current = entry.get_mut();
                current.source_count += 1;
                // Strictly greater magnitude replaces; equal magnitude
                // keeps the first-seen value (stable tie-break).
                if obs.value.abs() > current.value.abs() {
                    current.value = obs.value;
                }
            }
        }
    }

    stats.selected = selected.len();
    debug!(
        "Reduced {} observations to {} canonical facts ({} skipped)",
        stats.considered,
        stats.selected,
        stats.skipped()
    );

    Ok(ReductionOutcome {
        facts: selected,
        stats,
    })
}

/// Promote newly-mapped raw observations from the store into canonical
/// facts without re-ingesting filings.
///
/// Only consolidated observations are considered; keys that already hold
/// a canonical value are left untouched. With `dry_run` the would-be
/// facts are returned without writing.
pub fn backfill_canonical_from_raw(
    store: &crate::store::FactStore,
    concept_map: &HashMap<&str, &str>,
    companies: Option<&[String]>,
    dry_run: bool,
    config: &EngineConfig,
) -> anyhow::Result<Vec<CanonicalFact>> {
    let existing = store.canonical_keys()?;
    let raw = store.raw_observations(None)?;

    let filtered: Vec<RawFactObservation> = raw
        .into_iter()
        .filter(|obs| match companies {
            Some(list) => list.iter().any(|c| c == &obs.company),
            None => true,
        })
        .collect();

    let outcome = reduce(&filtered, concept_map, None, ReductionMode::Strict, config)?;

    let mut promoted = Vec::new();
    for (key, fact) in outcome.facts {
        if existing.contains(&(key.company.clone(), key.year, key.metric.clone())) {
            continue;
        }
        if !dry_run {
            store.put_canonical(&fact)?;
        }
        promoted.push(fact);
    }

    info!(
        "Backfill complete: {} facts promoted{}",
        promoted.len(),
        if dry_run { " (dry run)" } else { "" }
    );
    Ok(promoted)
}
