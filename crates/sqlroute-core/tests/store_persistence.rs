use sqlroute_core::model::{InteractionSource, RecordOutcome};
use sqlroute_core::similarity::{question_hash, SimilarityMetric};
use sqlroute_core::storage::Store;
use tempfile::tempdir;

#[test]
fn history_survives_reopen() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("nested").join("memory.db");

    {
        let store = Store::open(&path)?;
        store.init_schema()?;
        let rows = serde_json::json!([{ "id": 1, "name": "Alice" }]);
        store.record(
            "List all users.",
            "SELECT * FROM users;",
            Some(&rows),
            InteractionSource::Ask,
            0.85,
        )?;
        store.record(
            "Find all orders with an amount greater than 100.",
            "SELECT * FROM orders WHERE amount > 100;",
            None,
            InteractionSource::Train,
            0.85,
        )?;
    }

    let store = Store::open(&path)?;
    store.init_schema()?;
    let history = store.history()?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].question, "List all users.");
    assert_eq!(history[0].result.as_ref().unwrap()[0]["name"], "Alice");
    assert_eq!(history[1].source, InteractionSource::Train);
    assert!(history[0].id < history[1].id);

    let hit = store.find_similar("list all users", 0.95)?.expect("hash hit");
    assert_eq!(hit.score, 1.0);

    let stats = store.stats_best_effort()?;
    assert_eq!(stats.interactions, 2);
    assert_eq!(stats.trained, 1);
    assert!(stats.last_write_at.is_some());
    assert_eq!(stats.version, Some(2));
    Ok(())
}

#[test]
fn legacy_store_gains_source_column() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("old.db");
    {
        let conn = rusqlite::Connection::open(&path)?;
        conn.execute_batch(
            "CREATE TABLE interactions (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               question TEXT NOT NULL,
               question_sha256 TEXT NOT NULL,
               sql TEXT NOT NULL,
               result_json TEXT,
               created_at TEXT NOT NULL
             );",
        )?;
        conn.execute(
            "INSERT INTO interactions (question, question_sha256, sql, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                "List all users.",
                question_hash("List all users."),
                "SELECT * FROM users;",
                chrono::Utc::now()
            ],
        )?;
    }

    let store = Store::open(&path)?;
    store.init_schema()?;
    let history = store.history()?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, InteractionSource::Ask);
    Ok(())
}

#[test]
fn metric_choice_changes_near_match_scores() -> anyhow::Result<()> {
    let store = Store::memory()?.with_metric(SimilarityMetric::JaroWinkler);
    store.init_schema()?;
    store.append(
        "show all orders",
        "SELECT * FROM orders",
        None,
        InteractionSource::Ask,
    )?;

    let jw = store
        .find_similar("show all order", 0.5)?
        .expect("jaro-winkler match");
    let lev = SimilarityMetric::Levenshtein.score("show all orders", "show all order");
    assert!(jw.score > lev);

    let outcome = store.record(
        "show all order",
        "SELECT * FROM orders",
        None,
        InteractionSource::Ask,
        0.9,
    )?;
    assert!(matches!(outcome, RecordOutcome::Duplicate { .. }));
    Ok(())
}
