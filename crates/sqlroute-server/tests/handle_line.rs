use serde_json::{json, Value};
use sqlroute_core::config::{parse_config, RouterConfig};
use sqlroute_core::Router;
use sqlroute_server::config::ServerConfig;
use sqlroute_server::server::Server;
use tempfile::TempDir;

fn router_config(dir: &TempDir) -> anyhow::Result<RouterConfig> {
    let db = dir.path().join("app.db");
    let conn = rusqlite::Connection::open(&db)?;
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE orders (id INTEGER PRIMARY KEY, amount REAL);
         INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob');",
    )?;

    let mut cfg = parse_config(
        r#"
database: app.db
translator:
  provider: fake
  fake_rules:
    - contains: broken
      sql: SELECT missing FROM users
    - contains: users
      sql: SELECT * FROM users ORDER BY id
    - contains: orders
      sql: SELECT * FROM orders
"#,
        true,
    )?;
    cfg.database = db.to_string_lossy().to_string();
    cfg.store = dir.path().join("memory.db").to_string_lossy().to_string();
    Ok(cfg)
}

async fn call(server: &Server, req: Value) -> Value {
    let resp = server
        .handle_line(&req.to_string())
        .await
        .expect("response");
    serde_json::to_value(&resp).expect("serializable")
}

fn server(dir: &TempDir, cfg: ServerConfig) -> anyhow::Result<Server> {
    let router = Router::from_config(&router_config(dir)?)?;
    Ok(Server::new(router, cfg))
}

#[tokio::test]
async fn query_history_and_train() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = server(&dir, ServerConfig::default())?;

    let init = call(&server, json!({"jsonrpc": "2.0", "method": "initialize", "id": 1})).await;
    assert_eq!(init["result"]["serverInfo"]["name"], "sqlroute-server");

    let resp = call(
        &server,
        json!({"jsonrpc": "2.0", "method": "query", "params": {"question": "list users"}, "id": 2}),
    )
    .await;
    assert_eq!(resp["id"], 2);
    assert_eq!(resp["result"]["status"], "ok");
    assert_eq!(resp["result"]["target"], "relational");
    assert_eq!(resp["result"]["rows"][1]["name"], "Bob");

    let resp = call(
        &server,
        json!({"jsonrpc": "2.0", "method": "query", "params": {"question": "all orders"}, "id": 3}),
    )
    .await;
    assert_eq!(resp["result"]["status"], "empty");
    assert_eq!(resp["result"]["message"], "No records found.");

    let resp = call(
        &server,
        json!({"jsonrpc": "2.0", "method": "train", "params": {"question": "How many users?", "sql": "SELECT COUNT(*) FROM users"}, "id": 4}),
    )
    .await;
    assert_eq!(resp["result"]["outcome"], "inserted");

    let resp = call(
        &server,
        json!({"jsonrpc": "2.0", "method": "train", "params": {"pairs": [
            {"user_query": "How many users", "sql_query": "SELECT COUNT(*) FROM users"},
            {"user_query": "Biggest order", "sql_query": "SELECT MAX(amount) FROM orders"}
        ]}, "id": 5}),
    )
    .await;
    assert_eq!(resp["result"]["summary"]["inserted"], 1);
    assert_eq!(resp["result"]["summary"]["duplicates"], 1);

    let resp = call(&server, json!({"jsonrpc": "2.0", "method": "history", "id": 6})).await;
    let interactions = resp["result"]["interactions"].as_array().expect("array");
    assert_eq!(interactions.len(), 4);
    assert_eq!(interactions[0]["question"], "list users");
    Ok(())
}

#[tokio::test]
async fn routed_errors_are_results() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = server(&dir, ServerConfig::default())?;

    let resp = call(
        &server,
        json!({"jsonrpc": "2.0", "method": "query", "params": {"question": "broken users"}, "id": 1}),
    )
    .await;
    assert!(resp.get("error").is_none());
    assert_eq!(resp["result"]["error"]["kind"], "ExecutionError");
    assert_eq!(resp["result"]["error"]["code"], "E_EXECUTION");
    Ok(())
}

#[tokio::test]
async fn protocol_errors() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = server(
        &dir,
        ServerConfig {
            max_msg_bytes: 200,
            ..ServerConfig::default()
        },
    )?;

    let resp = call(&server, json!({"jsonrpc": "2.0", "method": "drop_tables", "id": 1})).await;
    assert_eq!(resp["error"]["code"], -32601);

    let resp = call(&server, json!({"jsonrpc": "2.0", "method": "query", "params": {}, "id": 2})).await;
    assert_eq!(resp["error"]["code"], -32602);

    let big = json!({"jsonrpc": "2.0", "method": "query", "params": {"question": "x".repeat(500)}, "id": 3});
    let resp = call(&server, big).await;
    assert_eq!(resp["result"]["error"]["code"], "E_LIMIT_EXCEEDED");

    let resp = server.handle_line("{not json").await.expect("response");
    assert_eq!(serde_json::to_value(&resp)?["error"]["code"], -32700);

    assert!(server.handle_line("   ").await.is_none());
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await
        .is_none());
    Ok(())
}
