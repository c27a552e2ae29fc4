//! Relational schema snapshots.
//!
//! The provider owns one immutable [`SchemaSnapshot`] behind an `Arc` and
//! replaces it wholesale on refresh. Readers clone the `Arc`, so they always
//! see a complete snapshot from a single introspection pass.

use crate::errors::{RouteError, RouteResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

pub mod sqlite;

pub use sqlite::SqliteSchemaSource;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSnapshot {
    pub version: u64,
    pub refreshed_at: DateTime<Utc>,
    pub tables: BTreeMap<String, Vec<String>>,
}

impl SchemaSnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            refreshed_at: Utc::now(),
            tables: BTreeMap::new(),
        }
    }

    pub fn table_names(&self) -> BTreeSet<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(|c| c.as_slice())
    }

    /// One `TABLE name (col, ...)` line per table, for the translator prompt.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (name, cols) in &self.tables {
            out.push_str(&format!("TABLE {} ({})\n", name, cols.join(", ")));
        }
        out
    }
}

/// Introspects the relational back end.
pub trait SchemaSource: Send + Sync {
    fn read_tables(&self) -> anyhow::Result<BTreeMap<String, Vec<String>>>;
}

pub struct SchemaProvider {
    source: Arc<dyn SchemaSource>,
    interval: Duration,
    current: RwLock<Arc<SchemaSnapshot>>,
    // Held for the whole introspection pass so concurrent refreshers queue.
    last_refresh: Mutex<Option<Instant>>,
}

impl SchemaProvider {
    /// A provider with an empty snapshot; the first `refresh_if_stale` loads it.
    pub fn new(source: Arc<dyn SchemaSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            current: RwLock::new(Arc::new(SchemaSnapshot::empty())),
            last_refresh: Mutex::new(None),
        }
    }

    /// Builds a provider and loads its first snapshot, failing if the
    /// back end cannot be introspected.
    pub fn initialize(source: Arc<dyn SchemaSource>, interval: Duration) -> RouteResult<Self> {
        let provider = Self::new(source, interval);
        provider.force_refresh()?;
        Ok(provider)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn snapshot(&self) -> Arc<SchemaSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn current_tables(&self) -> BTreeSet<String> {
        self.snapshot().table_names()
    }

    pub fn refresh_if_stale(&self) -> RouteResult<Arc<SchemaSnapshot>> {
        let mut last = self.last_refresh.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(at) = *last {
            if at.elapsed() < self.interval {
                return Ok(self.snapshot());
            }
        }
        self.reload(&mut last)
    }

    pub fn force_refresh(&self) -> RouteResult<Arc<SchemaSnapshot>> {
        let mut last = self.last_refresh.lock().unwrap_or_else(|e| e.into_inner());
        self.reload(&mut last)
    }

    fn reload(&self, last: &mut Option<Instant>) -> RouteResult<Arc<SchemaSnapshot>> {
        let started = Instant::now();
        let tables = match self.source.read_tables() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(
                    event = "schema.refresh_failed",
                    error = %format!("{:#}", e),
                    kept_version = self.snapshot().version,
                );
                return Err(RouteError::schema_unavailable(format!(
                    "schema introspection failed: {:#}",
                    e
                )));
            }
        };

        let version = self.snapshot().version + 1;
        let next = Arc::new(SchemaSnapshot {
            version,
            refreshed_at: Utc::now(),
            tables,
        });
        {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            *guard = Arc::clone(&next);
        }
        *last = Some(Instant::now());

        tracing::debug!(
            event = "schema.refreshed",
            version = version,
            tables = next.tables.len(),
            duration_ms = started.elapsed().as_millis() as u64,
        );
        Ok(next)
    }
}

/// In-memory schema source, mainly for tests and demos.
#[derive(Clone, Default)]
pub struct StaticSchemaSource {
    tables: Arc<Mutex<Option<BTreeMap<String, Vec<String>>>>>,
}

impl StaticSchemaSource {
    pub fn new(tables: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Some(tables))),
        }
    }

    /// `("users", "id, name")` style pairs; columns are comma separated.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(t, cols)| {
                    let cols = cols
                        .split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect();
                    (t.to_string(), cols)
                })
                .collect(),
        )
    }

    pub fn replace(&self, tables: BTreeMap<String, Vec<String>>) {
        *self.tables.lock().unwrap_or_else(|e| e.into_inner()) = Some(tables);
    }

    /// Makes every subsequent read fail until `replace` is called.
    pub fn set_unavailable(&self) {
        *self.tables.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl SchemaSource for StaticSchemaSource {
    fn read_tables(&self) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| anyhow::anyhow!("schema source unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn first_refresh_loads_then_caches() {
        let src = StaticSchemaSource::from_pairs(&[("users", "id, name")]);
        let p = SchemaProvider::new(Arc::new(src.clone()), Duration::from_secs(60));
        assert!(p.current_tables().is_empty());

        let s1 = p.refresh_if_stale().unwrap();
        assert_eq!(s1.version, 1);

        src.replace(BTreeMap::from([("orders".to_string(), vec!["id".to_string()])]));
        let s2 = p.refresh_if_stale().unwrap();
        assert_eq!(s2.version, 1, "fresh snapshot must not be reloaded");
        assert!(s2.tables.contains_key("users"));
    }

    #[test]
    fn zero_interval_always_reloads() {
        let src = StaticSchemaSource::from_pairs(&[("users", "id")]);
        let p = SchemaProvider::new(Arc::new(src.clone()), Duration::ZERO);
        p.refresh_if_stale().unwrap();
        src.replace(BTreeMap::from([("orders".to_string(), vec!["id".to_string()])]));
        let s = p.refresh_if_stale().unwrap();
        assert_eq!(s.version, 2);
        assert_eq!(s.table_names(), BTreeSet::from(["orders".to_string()]));
    }

    #[test]
    fn failed_refresh_keeps_last_good_snapshot() {
        let src = StaticSchemaSource::from_pairs(&[("users", "id")]);
        let p = SchemaProvider::initialize(Arc::new(src.clone()), Duration::ZERO).unwrap();

        src.set_unavailable();
        let err = p.force_refresh().unwrap_err();
        assert_eq!(err.kind, ErrorKind::SchemaUnavailable);
        assert_eq!(p.snapshot().version, 1);
        assert!(p.current_tables().contains("users"));
    }

    #[test]
    fn initialize_fails_without_source() {
        let src = StaticSchemaSource::default();
        let err = SchemaProvider::initialize(Arc::new(src), DEFAULT_REFRESH_INTERVAL)
            .err()
            .expect("must fail");
        assert_eq!(err.kind, ErrorKind::SchemaUnavailable);
    }

    #[test]
    fn describe_lists_tables_in_order() {
        let src = StaticSchemaSource::from_pairs(&[
            ("users", "id, name"),
            ("orders", "id, amount"),
        ]);
        let p = SchemaProvider::initialize(Arc::new(src), DEFAULT_REFRESH_INTERVAL).unwrap();
        assert_eq!(
            p.snapshot().describe(),
            "TABLE orders (id, amount)\nTABLE users (id, name)\n"
        );
    }
}
