//! Flat-file (CSV) datasets loaded into memory.

use crate::errors::{RouteError, RouteResult};
use moka::sync::Cache;
use rusqlite::types::{ToSql, ToSqlOutput};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

pub const DEFAULT_CACHE_ENTRIES: u64 = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    /// Infers the narrowest scalar for one raw CSV field.
    pub fn infer(raw: &str) -> Self {
        let t = raw.trim();
        if t.is_empty() {
            return Cell::Null;
        }
        if let Ok(i) = t.parse::<i64>() {
            return Cell::Integer(i);
        }
        if let Ok(f) = t.parse::<f64>() {
            if f.is_finite() {
                return Cell::Real(f);
            }
        }
        Cell::Text(raw.to_string())
    }
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::from(rusqlite::types::Null),
            Cell::Integer(i) => ToSqlOutput::from(*i),
            Cell::Real(f) => ToSqlOutput::from(*f),
            Cell::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

/// An immutable in-memory table.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn from_csv<R: Read>(name: &str, reader: R) -> RouteResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| RouteError::dataset_parse(format!("dataset '{}': {}", name, e)))?
            .clone();
        if headers.is_empty() {
            return Err(RouteError::dataset_parse(format!(
                "dataset '{}' has no header row",
                name
            )));
        }
        let columns = unique_column_names(headers.iter());

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record
                .map_err(|e| RouteError::dataset_parse(format!("dataset '{}': {}", name, e)))?;
            rows.push(record.iter().map(Cell::infer).collect());
        }

        Ok(Self {
            name: name.to_string(),
            columns,
            rows,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Makes column names usable as SQL identifiers: blanks get a positional
/// name, repeats get a numeric suffix.
pub(crate) fn unique_column_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (i, raw) in names.enumerate() {
        let base = match raw.trim() {
            "" => format!("column_{}", i + 1),
            s => s.to_string(),
        };
        let mut name = base.clone();
        let mut n = 2;
        while !seen.insert(name.to_lowercase()) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        out.push(name);
    }
    out
}

type CacheKey = (PathBuf, Option<SystemTime>, u64);

/// Named CSV datasets. Loaded tables are cached by file identity
/// (path, modification time, length); edits to a file produce a new key.
#[derive(Clone)]
pub struct TabularProvider {
    datasets: BTreeMap<String, PathBuf>,
    cache: Cache<CacheKey, Arc<Table>>,
}

impl TabularProvider {
    pub fn new(datasets: BTreeMap<String, PathBuf>, cache_entries: u64) -> Self {
        Self {
            datasets,
            cache: Cache::new(cache_entries),
        }
    }

    pub fn dataset_names(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    fn path_of(&self, name: &str) -> RouteResult<&Path> {
        self.datasets
            .get(name)
            .map(|p| p.as_path())
            .ok_or_else(|| RouteError::dataset_not_found(format!("unknown dataset '{}'", name)))
    }

    pub fn load(&self, name: &str) -> RouteResult<Arc<Table>> {
        let path = self.path_of(name)?;
        let meta = std::fs::metadata(path).map_err(|_| missing_file(name, path))?;
        if !meta.is_file() {
            return Err(missing_file(name, path));
        }

        let key: CacheKey = (path.to_path_buf(), meta.modified().ok(), meta.len());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let file = std::fs::File::open(path).map_err(|_| missing_file(name, path))?;
        let table = Arc::new(Table::from_csv(name, std::io::BufReader::new(file))?);
        tracing::debug!(
            event = "tabular.loaded",
            dataset = name,
            rows = table.row_count(),
            columns = table.columns.len(),
        );
        self.cache.insert(key, Arc::clone(&table));
        Ok(table)
    }

    /// Header row only.
    pub fn columns(&self, name: &str) -> RouteResult<Vec<String>> {
        let path = self.path_of(name)?;
        let file = std::fs::File::open(path).map_err(|_| missing_file(name, path))?;
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
        let headers = rdr
            .headers()
            .map_err(|e| RouteError::dataset_parse(format!("dataset '{}': {}", name, e)))?;
        Ok(unique_column_names(headers.iter()))
    }

    /// One `CSV name (col, ...)` line per readable dataset.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for name in self.datasets.keys() {
            match self.columns(name) {
                Ok(cols) => out.push_str(&format!("CSV {} ({})\n", name, cols.join(", "))),
                Err(e) => tracing::warn!(event = "tabular.describe_failed", dataset = %name, error = %e),
            }
        }
        out
    }
}

// Only the file name is reported; directories stay out of user-facing text.
fn missing_file(name: &str, path: &Path) -> RouteError {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    RouteError::dataset_not_found(format!("dataset '{}' file '{}' does not exist", name, file))
}
