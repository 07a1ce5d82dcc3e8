//! SQLite-backed fact store.
//!
//! Four flat tables: raw observations, canonical facts, derived metrics
//! (value plus provenance in one row, so a reader can never see one
//! without the other) and free-text playbook rules. Typed accessors
//! only; selection and computation logic live in the reducer and
//! evaluator modules.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use finfact_common::types::{
    CanonicalFact, DerivedMetricKind, DerivedMetricResult, Period, PlaybookRule, Provenance,
    RawFactObservation,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Fact store handle. Cheap to clone; all clones share one connection
/// under a mutex, so every statement is atomic with respect to readers.
#[derive(Clone)]
pub struct FactStore {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl FactStore {
    /// Open or create the store at a specific path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS raw_observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                concept_qname TEXT NOT NULL,
                concept_local_name TEXT NOT NULL,
                concept_namespace TEXT,
                numeric_value REAL NOT NULL,
                unit TEXT,
                period_type TEXT NOT NULL,
                start_date TEXT,
                end_date TEXT NOT NULL,
                fiscal_year INTEGER NOT NULL,
                context_id TEXT NOT NULL,
                dimensions TEXT NOT NULL DEFAULT '{}',
                is_consolidated INTEGER NOT NULL DEFAULT 0,
                company TEXT NOT NULL,
                filing_source TEXT,
                ingested_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        // Dedup key as a COALESCE index: a NULL filing_source would make
        // a plain UNIQUE constraint treat every re-insert as distinct.
        conn.execute(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_raw_dedup
            ON raw_observations(company, COALESCE(filing_source, ''), context_id,
                                concept_local_name, numeric_value)
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS canonical_facts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company TEXT NOT NULL,
                year INTEGER NOT NULL,
                metric TEXT NOT NULL,
                value REAL NOT NULL,
                source_count INTEGER NOT NULL DEFAULT 1,
                UNIQUE(company, year, metric)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS derived_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company TEXT NOT NULL,
                year INTEGER NOT NULL,
                metric TEXT NOT NULL,
                value REAL,
                metric_type TEXT NOT NULL,
                provenance TEXT NOT NULL,
                computed_at TEXT NOT NULL,
                UNIQUE(company, year, metric)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS playbook_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rule TEXT NOT NULL,
                added_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_raw_company_year ON raw_observations(company, fiscal_year)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_canonical_lookup ON canonical_facts(metric, year, company)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_derived_lookup ON derived_metrics(metric, year, company)",
            [],
        )?;

        Ok(())
    }

    // === Raw observations ===

    /// Insert one raw observation. Returns false when the dedup index
    /// already holds an identical record; an absent filing source counts
    /// as the same source, not a new one.
    pub fn insert_raw(&self, obs: &RawFactObservation) -> Result<bool> {
        let conn = self.conn.lock().unwrap();

        let (start_date, end_date) = match &obs.period {
            Period::Instant { date } => (None, date.to_string()),
            Period::Duration { start, end } => (Some(start.to_string()), end.to_string()),
        };
        let dims = serde_json::to_string(&obs.dimensions)?;

        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO raw_observations
                (concept_qname, concept_local_name, concept_namespace, numeric_value,
                 unit, period_type, start_date, end_date, fiscal_year, context_id,
                 dimensions, is_consolidated, company, filing_source, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                &obs.concept_qname,
                &obs.concept_local_name,
                &obs.concept_namespace,
                obs.value,
                &obs.unit,
                obs.period.type_str(),
                start_date,
                end_date,
                obs.fiscal_year(),
                &obs.context_id,
                dims,
                obs.is_consolidated(),
                &obs.company,
                &obs.filing_source,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// All stored raw observations, optionally filtered to one company.
    /// Ordered by insertion so reduction tie-breaks stay first-seen stable.
    pub fn raw_observations(&self, company: Option<&str>) -> Result<Vec<RawFactObservation>> {
        let conn = self.conn.lock().unwrap();

        let sql = r#"
            SELECT concept_qname, concept_local_name, concept_namespace, numeric_value,
                   unit, period_type, start_date, end_date, context_id, dimensions,
                   company, filing_source
            FROM raw_observations
            WHERE (?1 IS NULL OR company = ?1)
            ORDER BY id
        "#;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![company], |row| {
            let period_type: String = row.get(5)?;
            let start_date: Option<String> = row.get(6)?;
            let end_date: String = row.get(7)?;
            let dims_json: String = row.get(9)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, Option<String>>(4)?,
                period_type,
                start_date,
                end_date,
                row.get::<_, String>(8)?,
                dims_json,
                row.get::<_, String>(10)?,
                row.get::<_, Option<String>>(11)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (
                concept_qname,
                concept_local_name,
                concept_namespace,
                value,
                unit,
                period_type,
                start_date,
                end_date,
                context_id,
                dims_json,
                company,
                filing_source,
            ) = row?;

            let end = parse_date(&end_date)?;
            let period = if period_type == "duration" {
                match start_date.as_deref() {
                    Some(s) => Period::Duration {
                        start: parse_date(s)?,
                        end,
                    },
                    // Duration row without a start date is unusable as a
                    // duration; treat as instant at the period end.
                    None => Period::Instant { date: end },
                }
            } else {
                Period::Instant { date: end }
            };

            let dimensions: BTreeMap<String, String> =
                serde_json::from_str(&dims_json).unwrap_or_default();

            out.push(RawFactObservation {
                concept_qname,
                concept_local_name,
                concept_namespace,
                value,
                unit,
                period,
                context_id,
                dimensions,
                company,
                filing_source,
            });
        }
        Ok(out)
    }

    // === Canonical facts ===

    /// Store one canonical fact, replacing any previous value for the key.
    pub fn put_canonical(&self, fact: &CanonicalFact) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO canonical_facts (company, year, metric, value, source_count)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                &fact.company,
                fact.year,
                &fact.metric,
                fact.value,
                fact.source_count
            ],
        )?;
        Ok(())
    }

    pub fn get_canonical(&self, metric: &str, year: i32, company: &str) -> Result<Option<f64>> {
        Ok(self
            .get_canonical_with_count(metric, year, company)?
            .map(|(v, _)| v))
    }

    /// Value plus the number of raw observations reduction chose among.
    pub fn get_canonical_with_count(
        &self,
        metric: &str,
        year: i32,
        company: &str,
    ) -> Result<Option<(f64, i64)>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT value, source_count FROM canonical_facts
                 WHERE metric = ? AND year = ? AND company = ?",
                params![metric, year, company],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// Canonical value one fiscal year earlier.
    pub fn get_previous_year(&self, metric: &str, year: i32, company: &str) -> Result<Option<f64>> {
        self.get_canonical(metric, year - 1, company)
    }

    /// Ordered (year, value) series; absent years are gaps, never zero.
    pub fn get_timeseries(
        &self,
        company: &str,
        metric: &str,
        years: &[i32],
    ) -> Result<Vec<(i32, Option<f64>)>> {
        let mut series = Vec::with_capacity(years.len());
        for &year in years {
            series.push((year, self.get_canonical(metric, year, company)?));
        }
        Ok(series)
    }

    /// Years with a canonical value for (company, metric), ascending.
    pub fn years_for(&self, company: &str, metric: &str) -> Result<Vec<i32>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT year FROM canonical_facts
             WHERE company = ? AND metric = ? ORDER BY year",
        )?;
        let years = stmt
            .query_map(params![company, metric], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(years)
    }

    /// Years with any canonical value for a company, ascending. Used as
    /// the candidate range when a derived metric has no canonical rows
    /// of its own.
    pub fn years_for_company(&self, company: &str) -> Result<Vec<i32>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT year FROM canonical_facts
             WHERE company = ? ORDER BY year",
        )?;
        let years = stmt
            .query_map(params![company], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(years)
    }

    pub fn available_companies(&self) -> Result<BTreeSet<String>> {
        self.distinct_column("company")
    }

    pub fn available_metrics(&self) -> Result<BTreeSet<String>> {
        self.distinct_column("metric")
    }

    fn distinct_column(&self, column: &str) -> Result<BTreeSet<String>> {
        let conn = self.conn.lock().unwrap();
        // Column name comes from the two callers above, never from input.
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {} FROM canonical_facts",
            column
        ))?;
        let values = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;
        Ok(values)
    }

    /// All (company, year, metric) keys that already hold a canonical value.
    pub fn canonical_keys(&self) -> Result<BTreeSet<(String, i32, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT company, year, metric FROM canonical_facts")?;
        let keys = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<BTreeSet<(String, i32, String)>>>()?;
        Ok(keys)
    }

    // === Derived metrics ===

    /// Store a derived result. Value and provenance land in one statement,
    /// so the key's record is atomic; recomputation overwrites
    /// deterministically.
    pub fn put_derived(&self, result: &DerivedMetricResult) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let provenance = serde_json::to_string(&result.provenance)?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO derived_metrics
                (company, year, metric, value, metric_type, provenance, computed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                &result.company,
                result.year,
                &result.metric,
                result.value,
                result.kind.as_str(),
                provenance,
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!("Stored derived metric {}/{}/{}", result.company, result.year, result.metric);
        Ok(())
    }

    /// Stored value for a derived metric. None when the row is missing
    /// or when the stored computation explicitly failed.
    pub fn get_derived(&self, metric: &str, year: i32, company: &str) -> Result<Option<f64>> {
        Ok(self
            .get_derived_record(metric, year, company)?
            .and_then(|r| r.value))
    }

    /// Full stored derived record including provenance.
    pub fn get_derived_record(
        &self,
        metric: &str,
        year: i32,
        company: &str,
    ) -> Result<Option<DerivedMetricResult>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(Option<f64>, String, String)> = conn
            .query_row(
                "SELECT value, metric_type, provenance FROM derived_metrics
                 WHERE metric = ? AND year = ? AND company = ?",
                params![metric, year, company],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((value, metric_type, provenance_json)) => {
                let provenance: Provenance =
                    serde_json::from_str(&provenance_json).unwrap_or_default();
                Ok(Some(DerivedMetricResult {
                    company: company.to_string(),
                    year,
                    metric: metric.to_string(),
                    value,
                    kind: DerivedMetricKind::parse(&metric_type),
                    provenance,
                }))
            }
        }
    }

    // === Playbook rules ===

    /// Append a free-text heuristic. Rules are never updated or deleted.
    pub fn append_playbook_rule(&self, rule: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO playbook_rules (rule, added_at) VALUES (?, ?)",
            params![rule, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn playbook_rules(&self) -> Result<Vec<PlaybookRule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, rule FROM playbook_rules ORDER BY id")?;
        let rules = stmt
            .query_map([], |row| {
                Ok(PlaybookRule {
                    id: row.get(0)?,
                    rule: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Bad stored date: {}", s))
}
