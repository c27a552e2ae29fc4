use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONFIG: &str = r#"configVersion: 1
database: app.db
store: state/memory.db
datasets:
  sales: sales.csv
translator:
  provider: fake
  fake_rules:
    - contains: broken
      sql: SELECT nope FROM users
    - contains: users
      sql: SELECT id, name FROM users ORDER BY id
    - contains: sales
      sql: SELECT product, SUM(quantity) AS total FROM sales GROUP BY product ORDER BY product
"#;

fn workspace() -> anyhow::Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let conn = rusqlite::Connection::open(dir.path().join("app.db"))?;
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob');",
    )?;
    std::fs::write(
        dir.path().join("sales.csv"),
        "product,quantity\nLaptop,2\nMouse,10\nLaptop,1\n",
    )?;
    let config = dir.path().join("sqlroute.yaml");
    std::fs::write(&config, CONFIG)?;
    Ok((dir, config))
}

fn sqlroute(config: &Path) -> anyhow::Result<Command> {
    let mut cmd = Command::cargo_bin("sqlroute")?;
    cmd.env_remove("SQLROUTE_DB")
        .env_remove("SQLROUTE_STORE")
        .env("SQLROUTE_CONFIG", config);
    Ok(cmd)
}

#[test]
fn ask_prints_rows() -> anyhow::Result<()> {
    let (_dir, config) = workspace()?;
    sqlroute(&config)?
        .args(["ask", "show all users"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(relational, translator)"))
        .stdout(predicate::str::contains("Alice"))
        .stdout(predicate::str::contains("(2 rows)"));
    Ok(())
}

#[test]
fn ask_json_for_dataset() -> anyhow::Result<()> {
    let (_dir, config) = workspace()?;
    let out = sqlroute(&config)?
        .args(["ask", "sales by product", "--format", "json"])
        .output()?;
    assert!(out.status.success());

    let answer: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(answer["target"], "tabular");
    assert_eq!(answer["outcome"]["status"], "rows");
    assert_eq!(answer["outcome"]["rows"][0]["product"], "Laptop");
    assert_eq!(answer["outcome"]["rows"][0]["total"], 3);
    Ok(())
}

#[test]
fn routed_error_exits_1() -> anyhow::Result<()> {
    let (_dir, config) = workspace()?;
    sqlroute(&config)?
        .args(["ask", "something broken about users"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E_EXECUTION"));

    sqlroute(&config)?
        .args(["history", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
    Ok(())
}

#[test]
fn trained_pair_is_reused() -> anyhow::Result<()> {
    let (_dir, config) = workspace()?;
    sqlroute(&config)?
        .args([
            "train",
            "--question",
            "How many users are there?",
            "--sql",
            "SELECT COUNT(*) AS n FROM users",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("stored as #"));

    sqlroute(&config)?
        .args(["ask", "how many users are there"])
        .assert()
        .success()
        .stdout(predicate::str::contains("memory, similarity 1.00"))
        .stdout(predicate::str::contains("(1 row)"));

    sqlroute(&config)?
        .args(["history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[train]"))
        .stdout(predicate::str::contains("SELECT COUNT(*) AS n FROM users"));
    Ok(())
}

#[test]
fn import_accepts_legacy_field_names() -> anyhow::Result<()> {
    let (dir, config) = workspace()?;
    let pairs = dir.path().join("pairs.json");
    std::fs::write(
        &pairs,
        r#"[
  {"user_query": "List all users.", "sql_query": "SELECT * FROM users;"},
  {"user_query": "list all users", "sql_query": "SELECT * FROM users;"},
  {"question": "Total quantity per product", "sql": "SELECT product, SUM(quantity) FROM sales GROUP BY product"}
]"#,
    )?;

    sqlroute(&config)?
        .arg("import")
        .arg(&pairs)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 2 pair(s), skipped 1 duplicate(s)"));
    Ok(())
}

#[test]
fn schema_lists_tables_and_datasets() -> anyhow::Result<()> {
    let (_dir, config) = workspace()?;
    sqlroute(&config)?
        .args(["schema", "--refresh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TABLE users (id, name)"))
        .stdout(predicate::str::contains("CSV sales (product, quantity)"));
    Ok(())
}

#[test]
fn doctor_flags_missing_dataset() -> anyhow::Result<()> {
    let (dir, config) = workspace()?;
    std::fs::remove_file(dir.path().join("sales.csv"))?;
    sqlroute(&config)?
        .arg("doctor")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[ok] database: 1 tables"))
        .stdout(predicate::str::contains("[!!] dataset sales"));
    Ok(())
}

#[test]
fn missing_config_is_fatal() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    sqlroute(&dir.path().join("nope.yaml"))?
        .args(["ask", "anything"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("fatal"));
    Ok(())
}

#[test]
fn init_writes_sample_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("conf/sqlroute.yaml");
    sqlroute(&config)?.arg("init").assert().success();
    assert!(std::fs::read_to_string(&config)?.starts_with("configVersion: 1"));

    sqlroute(&config)?
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));
    Ok(())
}
