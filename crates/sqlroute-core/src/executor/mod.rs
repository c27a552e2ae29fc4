//! Runs SQL against the relational database or the tabular datasets.

use crate::errors::{ErrorKind, RouteError, RouteResult};
use crate::model::{QueryOutcome, Row, Target};
use crate::redaction::RedactionPolicy;
use crate::tabular::{unique_column_names, Table, TabularProvider};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub mod rewrite;

pub use rewrite::{alias_for, referenced_names, rewrite_identifiers};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);
pub const DEFAULT_MAX_ROWS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub timeout: Duration,
    pub max_rows: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

#[derive(Clone)]
pub struct QueryExecutor {
    database: PathBuf,
    tabular: TabularProvider,
    settings: ExecutorSettings,
    redaction: RedactionPolicy,
}

impl QueryExecutor {
    pub fn new(database: impl Into<PathBuf>, tabular: TabularProvider, settings: ExecutorSettings) -> Self {
        let database = database.into();
        let redaction = RedactionPolicy::new().with_path(&database);
        Self {
            database,
            tabular,
            settings,
            redaction,
        }
    }

    pub fn with_redaction(mut self, redaction: RedactionPolicy) -> Self {
        self.redaction = redaction.with_path(&self.database);
        self
    }

    pub fn database(&self) -> &Path {
        &self.database
    }

    pub fn tabular(&self) -> &TabularProvider {
        &self.tabular
    }

    /// Executes one statement. A statement that yields no rows is
    /// `QueryOutcome::Empty`, not an error. Nothing is retried.
    pub async fn execute(&self, sql: &str, target: Target) -> RouteResult<QueryOutcome> {
        let started = Instant::now();
        let result = match target {
            Target::Relational => self.execute_relational(sql).await,
            Target::Tabular => self.execute_tabular(sql).await,
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => tracing::debug!(
                event = "executor.done",
                target = target.as_str(),
                rows = outcome.rows().len(),
                duration_ms,
            ),
            Err(e) => tracing::warn!(
                event = "executor.failed",
                target = target.as_str(),
                kind = e.kind.as_str(),
                duration_ms,
            ),
        }
        result
    }

    async fn execute_relational(&self, sql: &str) -> RouteResult<QueryOutcome> {
        let conn = Connection::open_with_flags(
            &self.database,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| self.engine_error(&e))?;

        let sql = rewrite::strip_terminator(sql).to_string();
        let max_rows = self.settings.max_rows;
        let redaction = self.redaction.clone();
        self.run_with_deadline(conn, move |conn| {
            run_query(conn, &sql, max_rows)
                .map_err(|e| RouteError::execution(redaction.redact(&e.to_string())))
        })
        .await
    }

    async fn execute_tabular(&self, sql: &str) -> RouteResult<QueryOutcome> {
        let known: BTreeSet<String> = self.tabular.dataset_names().into_iter().collect();
        let sql = rewrite::strip_terminator(sql);
        let referenced = rewrite::referenced_names(sql, &known)
            .map_err(|e| RouteError::classify(ErrorKind::ExecutionError, &e))?;
        let renames: BTreeMap<String, String> = referenced
            .iter()
            .map(|name| (name.clone(), alias_for(name)))
            .collect();
        let rewritten = rewrite::rewrite_identifiers(sql, &renames)
            .map_err(|e| RouteError::classify(ErrorKind::ExecutionError, &e))?;
        tracing::debug!(event = "executor.rewrite", datasets = ?referenced);

        let conn = Connection::open_in_memory().map_err(|e| self.engine_error(&e))?;
        let tabular = self.tabular.clone();
        let max_rows = self.settings.max_rows;
        let redaction = self.redaction.clone();
        self.run_with_deadline(conn, move |conn| {
            for name in &referenced {
                // dataset errors pass through with their own kind
                let table = tabular.load(name)?;
                materialize(conn, &alias_for(name), &table)
                    .map_err(|e| RouteError::execution(redaction.redact(&e.to_string())))?;
            }
            run_query(conn, &rewritten, max_rows)
                .map_err(|e| RouteError::execution(redaction.redact(&e.to_string())))
        })
        .await
    }

    /// Runs `work` on the blocking pool. When the deadline passes the
    /// connection is interrupted and the late result is discarded.
    async fn run_with_deadline<F>(&self, conn: Connection, work: F) -> RouteResult<QueryOutcome>
    where
        F: FnOnce(&Connection) -> RouteResult<QueryOutcome> + Send + 'static,
    {
        let interrupt = conn.get_interrupt_handle();
        let task = tokio::task::spawn_blocking(move || {
            let out = work(&conn);
            drop(conn);
            out
        });

        match tokio::time::timeout(self.settings.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(RouteError::execution(format!("query task failed: {}", join))),
            Err(_) => {
                interrupt.interrupt();
                Err(RouteError::execution(format!(
                    "query timed out after {} ms",
                    self.settings.timeout.as_millis()
                )))
            }
        }
    }

    fn engine_error(&self, e: &rusqlite::Error) -> RouteError {
        RouteError::execution(self.redaction.redact(&e.to_string()))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn materialize(conn: &Connection, alias: &str, table: &Table) -> rusqlite::Result<()> {
    let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(c)).collect();
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({})",
        quote_ident(alias),
        columns.join(", ")
    ))?;

    let placeholders = vec!["?"; columns.len()].join(", ");
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(alias),
            placeholders
        ))?;
        for row in &table.rows {
            stmt.execute(rusqlite::params_from_iter(row.iter()))?;
        }
    }
    tx.commit()
}

fn run_query(conn: &Connection, sql: &str, max_rows: usize) -> rusqlite::Result<QueryOutcome> {
    let mut stmt = conn.prepare(sql)?;
    let columns = unique_column_names(stmt.column_names().into_iter());

    let mut rows = stmt.query([])?;
    let mut out: Vec<Row> = Vec::new();
    while let Some(row) = rows.next()? {
        if out.len() >= max_rows {
            tracing::warn!(event = "executor.truncated", max_rows);
            break;
        }
        let mut obj = Row::new();
        for (i, name) in columns.iter().enumerate() {
            obj.insert(name.clone(), value_to_json(row.get_ref(i)?));
        }
        out.push(obj);
    }
    Ok(QueryOutcome::from_rows(out))
}

fn value_to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}
