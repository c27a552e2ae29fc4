use crate::model::{Interaction, InteractionSource, RecordOutcome, SimilarMatch};
use crate::similarity::{normalize_question, question_hash, SimilarityMetric};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const SELECT_INTERACTION: &str =
    "SELECT id, question, sql, result_json, source, created_at FROM interactions";

/// Append-only interaction store backed by SQLite.
///
/// All access goes through one connection behind a mutex, so a dedup check
/// and the insert it guards are never interleaved with another writer.
#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
    metric: SimilarityMetric,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub interactions: u64,
    pub trained: u64,
    pub last_write_at: Option<DateTime<Utc>>,
    pub version: Option<i64>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("failed to open interaction store")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            metric: SimilarityMetric::default(),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        // SQLite in-memory DB, gone when the last clone drops
        let conn =
            Connection::open_in_memory().context("failed to open in-memory interaction store")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            metric: SimilarityMetric::default(),
        })
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        migrate_v2(&conn)?;
        conn.pragma_update(None, "user_version", crate::storage::schema::SCHEMA_VERSION)?;
        Ok(())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("interaction store lock poisoned"))
    }

    /// Best match for `question` whose score strictly exceeds `threshold`.
    ///
    /// Among equal best scores the earliest insert wins; callers should not
    /// depend on which one that is.
    pub fn find_similar(
        &self,
        question: &str,
        threshold: f64,
    ) -> anyhow::Result<Option<SimilarMatch>> {
        let conn = self.lock()?;
        find_similar_in(&conn, self.metric, question, threshold)
    }

    /// Appends unless a stored question already scores above `dedup_threshold`.
    pub fn record(
        &self,
        question: &str,
        sql: &str,
        result: Option<&serde_json::Value>,
        source: InteractionSource,
        dedup_threshold: f64,
    ) -> anyhow::Result<RecordOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if let Some(existing) = find_similar_in(&tx, self.metric, question, dedup_threshold)? {
            tracing::debug!(
                event = "store.dedup_skip",
                existing_id = existing.interaction.id,
                score = existing.score,
            );
            return Ok(RecordOutcome::Duplicate {
                existing_id: existing.interaction.id,
                score: existing.score,
            });
        }

        let id = insert_interaction(&tx, question, sql, result, source)?;
        tx.commit()?;
        Ok(RecordOutcome::Inserted { id })
    }

    /// Appends without any dedup check.
    pub fn append(
        &self,
        question: &str,
        sql: &str,
        result: Option<&serde_json::Value>,
        source: InteractionSource,
    ) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        insert_interaction(&conn, question, sql, result, source)
    }

    pub fn get(&self, id: i64) -> anyhow::Result<Option<Interaction>> {
        let conn = self.lock()?;
        get_in(&conn, id)
    }

    /// Every interaction, in insertion order.
    pub fn history(&self) -> anyhow::Result<Vec<Interaction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY id ASC", SELECT_INTERACTION))?;
        let rows = stmt
            .query_map([], interaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> anyhow::Result<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM interactions", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn stats_best_effort(&self) -> anyhow::Result<StoreStats> {
        let conn = self.lock()?;

        let interactions: u64 = conn
            .query_row("SELECT COUNT(*) FROM interactions", [], |r| {
                r.get::<_, i64>(0).map(|x| x as u64)
            })
            .unwrap_or(0);
        let trained: u64 = conn
            .query_row(
                "SELECT COUNT(*) FROM interactions WHERE source = 'train'",
                [],
                |r| r.get::<_, i64>(0).map(|x| x as u64),
            )
            .unwrap_or(0);
        let last_write_at: Option<DateTime<Utc>> = conn
            .query_row(
                "SELECT created_at FROM interactions ORDER BY id DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()
            .ok()
            .flatten();
        let version: Option<i64> = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .ok();

        Ok(StoreStats {
            interactions,
            trained,
            last_write_at,
            version,
        })
    }
}

fn find_similar_in(
    conn: &Connection,
    metric: SimilarityMetric,
    question: &str,
    threshold: f64,
) -> anyhow::Result<Option<SimilarMatch>> {
    // Exact (normalized) repeats resolve through the hash index.
    let hash = question_hash(question);
    let exact: Option<i64> = conn
        .query_row(
            "SELECT id FROM interactions WHERE question_sha256 = ?1 ORDER BY id ASC LIMIT 1",
            params![hash],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = exact {
        if 1.0 > threshold {
            return Ok(get_in(conn, id)?.map(|interaction| SimilarMatch {
                interaction,
                score: 1.0,
            }));
        }
        return Ok(None);
    }

    let needle = normalize_question(question);
    let mut stmt = conn.prepare("SELECT id, question FROM interactions ORDER BY id ASC")?;
    let mut rows = stmt.query([])?;

    let mut best: Option<(i64, f64)> = None;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let stored: String = row.get(1)?;
        let score = metric.score_normalized(&needle, &normalize_question(&stored));
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((id, score));
        }
    }

    match best {
        Some((id, score)) if score > threshold => Ok(get_in(conn, id)?.map(|interaction| {
            SimilarMatch { interaction, score }
        })),
        _ => Ok(None),
    }
}

fn insert_interaction(
    conn: &Connection,
    question: &str,
    sql: &str,
    result: Option<&serde_json::Value>,
    source: InteractionSource,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO interactions(question, question_sha256, sql, result_json, source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            question,
            question_hash(question),
            sql,
            result,
            source.as_str(),
            Utc::now()
        ],
    )
    .context("insert interaction")?;
    Ok(conn.last_insert_rowid())
}

fn get_in(conn: &Connection, id: i64) -> anyhow::Result<Option<Interaction>> {
    let found = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT_INTERACTION),
            params![id],
            interaction_from_row,
        )
        .optional()?;
    Ok(found)
}

fn interaction_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Interaction> {
    let source: String = row.get(4)?;
    Ok(Interaction {
        id: row.get(0)?,
        question: row.get(1)?,
        sql: row.get(2)?,
        result: row.get(3)?,
        source: InteractionSource::parse(&source),
        created_at: row.get(5)?,
    })
}

// Stores written before source tracking have no `source` column.
fn migrate_v2(conn: &Connection) -> anyhow::Result<()> {
    let cols = get_columns(conn, "interactions")?;
    add_column_if_missing(
        conn,
        &cols,
        "interactions",
        "source",
        "TEXT NOT NULL DEFAULT 'ask'",
    )?;
    Ok(())
}

fn get_columns(conn: &Connection, table: &str) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

fn add_column_if_missing(
    conn: &Connection,
    cols: &HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> anyhow::Result<()> {
    if !cols.contains(col) {
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col, ty);
        conn.execute(&sql, [])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    #[test]
    fn exact_repeat_hits_hash_path() -> anyhow::Result<()> {
        let s = store();
        s.append("List all users.", "SELECT * FROM users;", None, InteractionSource::Ask)?;
        let m = s.find_similar("list   all users", 0.99)?.expect("match");
        assert_eq!(m.score, 1.0);
        assert_eq!(m.interaction.sql, "SELECT * FROM users;");
        Ok(())
    }

    #[test]
    fn threshold_is_strict() -> anyhow::Result<()> {
        let s = store();
        s.append("List all users.", "SELECT * FROM users;", None, InteractionSource::Ask)?;
        // identical question scores exactly 1.0, which does not exceed 1.0
        assert!(s.find_similar("List all users.", 1.0)?.is_none());
        Ok(())
    }

    #[test]
    fn first_of_equal_scores_wins() -> anyhow::Result<()> {
        let s = store();
        let first = s.append("count orders", "SELECT COUNT(*) FROM orders", None, InteractionSource::Ask)?;
        s.append("count orders", "SELECT COUNT(id) FROM orders", None, InteractionSource::Ask)?;
        let m = s.find_similar("count orders!", 0.5)?.expect("match");
        assert_eq!(m.interaction.id, first);
        Ok(())
    }

    #[test]
    fn record_skips_near_duplicates() -> anyhow::Result<()> {
        let s = store();
        let a = s.record("List all users.", "SELECT * FROM users;", None, InteractionSource::Ask, 0.85)?;
        let b = s.record("List all users", "SELECT * FROM users;", None, InteractionSource::Ask, 0.85)?;
        assert!(a.is_inserted());
        assert!(matches!(b, RecordOutcome::Duplicate { score, .. } if score == 1.0));
        assert_eq!(s.count()?, 1);
        Ok(())
    }

    #[test]
    fn result_payload_round_trips_as_json() -> anyhow::Result<()> {
        let s = store();
        let payload = serde_json::json!([{"id": 1, "name": "Alice"}]);
        let id = s.append("who", "SELECT 1", Some(&payload), InteractionSource::Train)?;
        let got = s.get(id)?.expect("row");
        assert_eq!(got.result, Some(payload));
        assert_eq!(got.source, InteractionSource::Train);
        Ok(())
    }
}
