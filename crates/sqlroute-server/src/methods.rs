//! JSON-RPC method handlers. Routed failures are ordinary results carrying
//! an `error` object; only malformed calls become protocol errors.

use serde_json::{json, Value};
use sqlroute_core::model::{Answer, TrainingPair, NO_RECORDS_MESSAGE};
use sqlroute_core::{RouteError, Router};

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

pub const METHODS: &[&str] = &["initialize", "query", "history", "train"];

#[derive(Debug, Clone, PartialEq)]
pub struct MethodError {
    pub code: i32,
    pub message: String,
}

impl MethodError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }
}

fn routed_error(e: &RouteError) -> Value {
    json!({ "error": e.to_json() })
}

fn str_param<'a>(params: Option<&'a Value>, key: &str) -> Result<&'a str, MethodError> {
    params
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .ok_or_else(|| MethodError::invalid_params(format!("missing string param '{}'", key)))
}

pub fn initialize() -> Value {
    json!({
        "serverInfo": {
            "name": "sqlroute-server",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "methods": METHODS,
    })
}

pub fn answer_json(answer: &Answer) -> Value {
    let mut out = json!({
        "status": if answer.outcome.is_empty() { "empty" } else { "ok" },
        "question": answer.question,
        "sql": answer.sql,
        "target": answer.target,
        "origin": answer.origin,
        "recorded": answer.recorded,
    });
    if let Some(score) = answer.similarity {
        out["similarity"] = json!(score);
    }
    if answer.outcome.is_empty() {
        out["message"] = json!(NO_RECORDS_MESSAGE);
    } else {
        out["rows"] = json!(answer.outcome.rows());
    }
    out
}

pub async fn query(router: &Router, params: Option<&Value>) -> Result<Value, MethodError> {
    let question = str_param(params, "question")?;
    Ok(match router.ask(question).await {
        Ok(answer) => answer_json(&answer),
        Err(e) => routed_error(&e),
    })
}

pub fn history(router: &Router) -> Result<Value, MethodError> {
    Ok(match router.history() {
        Ok(rows) => json!({ "interactions": rows }),
        Err(e) => routed_error(&e),
    })
}

/// `{question, sql}` for one pair, or `{pairs: [...], dedup?: bool}`.
pub fn train(router: &Router, params: Option<&Value>) -> Result<Value, MethodError> {
    if let Some(raw) = params.and_then(|p| p.get("pairs")) {
        let pairs: Vec<TrainingPair> = serde_json::from_value(raw.clone())
            .map_err(|e| MethodError::invalid_params(format!("invalid 'pairs': {}", e)))?;
        let dedup = params
            .and_then(|p| p.get("dedup"))
            .and_then(Value::as_bool)
            .unwrap_or(true);
        return Ok(match router.train_batch(&pairs, dedup) {
            Ok(summary) => json!({ "summary": summary }),
            Err(e) => routed_error(&e),
        });
    }

    let question = str_param(params, "question")?;
    let sql = str_param(params, "sql")?;
    Ok(match router.train(question, sql) {
        Ok(outcome) => json!(outcome),
        Err(e) => routed_error(&e),
    })
}
