use crate::config::RouterConfig;
use crate::errors::{ErrorKind, RouteError, RouteResult};
use crate::executor::{referenced_names, QueryExecutor};
use crate::model::{
    Answer, Interaction, InteractionSource, QueryOutcome, RecordOutcome, RoutingMode, SqlOrigin,
    Target, TrainingPair, TrainingSummary,
};
use crate::providers::llm;
use crate::redaction::RedactionPolicy;
use crate::schema::{SchemaProvider, SqliteSchemaSource};
use crate::storage::Store;
use crate::tabular::TabularProvider;
use crate::translator::{LlmTranslator, Translator};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};

#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub reuse_threshold: f64,
    pub dedup_threshold: f64,
    pub routing: RoutingMode,
    pub store_results: bool,
    pub translate_timeout: Duration,
    /// Extra translator attempts after the first failure.
    pub translate_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            reuse_threshold: 0.95,
            dedup_threshold: 0.85,
            routing: RoutingMode::Question,
            store_results: true,
            translate_timeout: Duration::from_secs(30),
            translate_retries: 1,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Owns every component a request touches. Cheap to clone; clones share
/// the store, the schema snapshot and the dataset cache.
#[derive(Clone)]
pub struct Router {
    store: Store,
    schema: Arc<SchemaProvider>,
    executor: QueryExecutor,
    translator: Arc<dyn Translator>,
    policy: RoutePolicy,
    redaction: RedactionPolicy,
}

impl Router {
    pub fn new(
        store: Store,
        schema: Arc<SchemaProvider>,
        executor: QueryExecutor,
        translator: Arc<dyn Translator>,
        policy: RoutePolicy,
    ) -> Self {
        Self {
            store,
            schema,
            executor,
            translator,
            policy,
            redaction: RedactionPolicy::new(),
        }
    }

    pub fn with_redaction(mut self, redaction: RedactionPolicy) -> Self {
        self.redaction = redaction;
        self
    }

    /// Wires every component from config. Fails if the store cannot be
    /// opened or the first schema snapshot cannot be taken.
    pub fn from_config(cfg: &RouterConfig) -> RouteResult<Self> {
        cfg.validate()?;

        let store = Store::open(Path::new(&cfg.store))
            .and_then(|s| {
                s.init_schema()?;
                Ok(s.with_metric(cfg.memory.similarity))
            })
            .map_err(|e| RouteError::classify(ErrorKind::StoreError, &e))?;

        let source = Arc::new(SqliteSchemaSource::new(&cfg.database));
        let schema = Arc::new(SchemaProvider::initialize(
            source,
            cfg.schema_refresh_interval(),
        )?);

        let api_key = cfg.api_key();
        let redaction = RedactionPolicy::new()
            .with_secret(api_key.as_deref())
            .with_path(Path::new(&cfg.database))
            .with_path(Path::new(&cfg.store));

        let client = llm::from_settings(&cfg.translator, api_key)
            .map_err(|e| RouteError::classify(ErrorKind::ConfigError, &e))?;
        let translator: Arc<dyn Translator> = Arc::new(LlmTranslator::new(client));

        let tabular = TabularProvider::new(cfg.dataset_paths(), cfg.executor.dataset_cache_entries);
        let executor = QueryExecutor::new(&cfg.database, tabular, cfg.executor_settings())
            .with_redaction(redaction.clone());

        tracing::info!(
            event = "router.ready",
            tables = schema.snapshot().tables.len(),
            datasets = cfg.datasets.len(),
            translator = translator.name(),
            routing = ?cfg.routing,
        );

        Ok(Self::new(store, schema, executor, translator, cfg.policy()).with_redaction(redaction))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn schema(&self) -> &SchemaProvider {
        &self.schema
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    pub fn translator_name(&self) -> &str {
        self.translator.name()
    }

    /// Answers one question: memory lookup, translation on a miss, target
    /// selection, execution, then recording.
    pub async fn ask(&self, question: &str) -> RouteResult<Answer> {
        let started = Instant::now();
        let question = question.trim();
        if question.is_empty() {
            return Err(RouteError::translation("question is empty"));
        }

        // the lookup scans every stored question
        let store = self.store.clone();
        let lookup = question.to_string();
        let threshold = self.policy.reuse_threshold;
        let remembered = tokio::task::spawn_blocking(move || store.find_similar(&lookup, threshold))
            .await
            .map_err(|e| RouteError::store(format!("memory lookup task failed: {}", e)))?
            .map_err(|e| RouteError::classify(ErrorKind::StoreError, &e))?;

        let (sql, origin, similarity) = match remembered {
            Some(hit) => {
                tracing::debug!(
                    event = "route.memory_hit",
                    interaction_id = hit.interaction.id,
                    score = hit.score,
                );
                (hit.interaction.sql, SqlOrigin::Memory, Some(hit.score))
            }
            None => (self.translate(question).await?, SqlOrigin::Translator, None),
        };

        let target = self.choose_target(question, &sql).await?;
        let outcome = self.executor.execute(&sql, target).await?;
        let recorded = self.record_answer(question, &sql, &outcome).await;

        tracing::info!(
            event = "route.answered",
            origin = ?origin,
            target = target.as_str(),
            rows = outcome.rows().len(),
            recorded,
            duration_ms = started.elapsed().as_millis() as u64,
        );

        Ok(Answer {
            question: question.to_string(),
            sql,
            target,
            origin,
            similarity,
            outcome,
            recorded,
        })
    }

    /// Relational tables followed by dataset headers, one per line.
    pub fn schema_description(&self) -> String {
        let mut out = self.schema.snapshot().describe();
        out.push_str(&self.executor.tabular().describe());
        out
    }

    async fn translate(&self, question: &str) -> RouteResult<String> {
        let schema = self.schema_description();
        let attempts = 1 + self.policy.translate_retries;
        let mut backoff = self.policy.retry_backoff;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let started = Instant::now();
            let result = timeout(
                self.policy.translate_timeout,
                self.translator.translate(question, &schema),
            )
            .await;
            match result {
                Ok(Ok(sql)) => {
                    tracing::debug!(
                        event = "route.translated",
                        attempt,
                        sql_len = sql.len(),
                        duration_ms = started.elapsed().as_millis() as u64,
                    );
                    return Ok(sql);
                }
                Ok(Err(e)) => last_error = format!("{:#}", e),
                Err(_) => {
                    last_error = format!(
                        "translator timed out after {} ms",
                        self.policy.translate_timeout.as_millis()
                    )
                }
            }

            tracing::warn!(
                event = "route.translate_failed",
                attempt,
                attempts,
                error = %self.redaction.redact(&last_error),
            );
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        Err(RouteError::translation(
            self.redaction.redact(&last_error).into_owned(),
        ))
    }

    async fn choose_target(&self, question: &str, sql: &str) -> RouteResult<Target> {
        let schema = Arc::clone(&self.schema);
        let snapshot = tokio::task::spawn_blocking(move || schema.refresh_if_stale())
            .await
            .map_err(|e| RouteError::schema_unavailable(format!("schema refresh task failed: {}", e)))??;

        let target = select_target(self.policy.routing, &snapshot.table_names(), question, sql);
        tracing::debug!(
            event = "route.target",
            target = target.as_str(),
            schema_version = snapshot.version,
        );
        Ok(target)
    }

    async fn record_answer(&self, question: &str, sql: &str, outcome: &QueryOutcome) -> bool {
        let payload = self.policy.store_results.then(|| outcome.payload());
        let store = self.store.clone();
        let (question, sql) = (question.to_string(), sql.to_string());
        let dedup_threshold = self.policy.dedup_threshold;
        let recorded = tokio::task::spawn_blocking(move || {
            store.record(
                &question,
                &sql,
                payload.as_ref(),
                InteractionSource::Ask,
                dedup_threshold,
            )
        })
        .await;

        match recorded {
            Ok(Ok(RecordOutcome::Inserted { id })) => {
                tracing::debug!(event = "route.recorded", interaction_id = id);
                true
            }
            Ok(Ok(RecordOutcome::Duplicate { existing_id, score })) => {
                tracing::debug!(event = "route.record_skipped", existing_id, score);
                false
            }
            Ok(Err(e)) => {
                tracing::warn!(event = "route.record_failed", error = %format!("{:#}", e));
                false
            }
            Err(e) => {
                tracing::warn!(event = "route.record_failed", error = %e);
                false
            }
        }
    }

    pub fn history(&self) -> RouteResult<Vec<Interaction>> {
        self.store
            .history()
            .map_err(|e| RouteError::classify(ErrorKind::StoreError, &e))
    }

    /// Seeds the memory with a known question/SQL pair. Nothing is executed.
    pub fn train(&self, question: &str, sql: &str) -> RouteResult<RecordOutcome> {
        let (question, sql) = (question.trim(), sql.trim());
        if question.is_empty() || sql.is_empty() {
            return Err(RouteError::store("training pairs need a question and SQL"));
        }
        let outcome = self
            .store
            .record(question, sql, None, InteractionSource::Train, self.policy.dedup_threshold)
            .map_err(|e| RouteError::classify(ErrorKind::StoreError, &e))?;
        tracing::info!(event = "route.trained", inserted = outcome.is_inserted());
        Ok(outcome)
    }

    /// Seeds many pairs. With `dedup` off every pair is appended as is.
    pub fn train_batch(&self, pairs: &[TrainingPair], dedup: bool) -> RouteResult<TrainingSummary> {
        let mut summary = TrainingSummary::default();
        for pair in pairs {
            if dedup {
                match self.train(&pair.question, &pair.sql)? {
                    RecordOutcome::Inserted { .. } => summary.inserted += 1,
                    RecordOutcome::Duplicate { .. } => summary.duplicates += 1,
                }
            } else {
                let (question, sql) = (pair.question.trim(), pair.sql.trim());
                if question.is_empty() || sql.is_empty() {
                    return Err(RouteError::store("training pairs need a question and SQL"));
                }
                self.store
                    .append(question, sql, None, InteractionSource::Train)
                    .map_err(|e| RouteError::classify(ErrorKind::StoreError, &e))?;
                summary.inserted += 1;
            }
        }
        Ok(summary)
    }
}

/// Picks the back end for one request. In question mode a table name must
/// occur verbatim (case-sensitive) in the question text; in SQL mode it must
/// appear as an identifier in the statement.
pub fn select_target(
    mode: RoutingMode,
    tables: &BTreeSet<String>,
    question: &str,
    sql: &str,
) -> Target {
    let relational = match mode {
        RoutingMode::Question => tables
            .iter()
            .any(|t| !t.is_empty() && question.contains(t.as_str())),
        RoutingMode::Sql => referenced_names(sql, tables)
            .map(|found| !found.is_empty())
            .unwrap_or(false),
    };
    if relational {
        Target::Relational
    } else {
        Target::Tabular
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn question_mode_is_case_sensitive_substring() {
        let t = tables(&["orders", "users"]);
        assert_eq!(
            select_target(RoutingMode::Question, &t, "show me all orders over 100", ""),
            Target::Relational
        );
        assert_eq!(
            select_target(RoutingMode::Question, &t, "show me sales by product", ""),
            Target::Tabular
        );
        assert_eq!(
            select_target(RoutingMode::Question, &t, "Show ORDERS", "SELECT * FROM orders"),
            Target::Tabular
        );
    }

    #[test]
    fn sql_mode_looks_at_identifiers() {
        let t = tables(&["orders", "users"]);
        assert_eq!(
            select_target(RoutingMode::Sql, &t, "anything", "SELECT * FROM Orders WHERE amount > 100"),
            Target::Relational
        );
        assert_eq!(
            select_target(RoutingMode::Sql, &t, "users", "SELECT 'users' FROM sales"),
            Target::Tabular
        );
    }
}
