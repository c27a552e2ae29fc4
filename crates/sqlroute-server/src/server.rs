use crate::config::ServerConfig;
use crate::methods::{self, MethodError, METHOD_NOT_FOUND, PARSE_ERROR};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlroute_core::Router;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time::timeout;

static RID: AtomicU64 = AtomicU64::new(1);

fn next_rid() -> String {
    let n = RID.fetch_add(1, Ordering::Relaxed);
    format!("r-{n:06}")
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

pub struct Server {
    router: Router,
    cfg: ServerConfig,
}

impl Server {
    pub fn new(router: Router, cfg: ServerConfig) -> Self {
        Self { router, cfg }
    }

    /// Serves stdin until EOF. Responses go to stdout, one per line.
    pub async fn run(&self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        for line in stdin.lock().lines() {
            let line = line?;
            if let Some(resp) = self.handle_line(&line).await {
                writeln!(stdout, "{}", serde_json::to_string(&resp)?)?;
                stdout.flush()?;
            }
        }
        tracing::info!(event = "server_stop");
        Ok(())
    }

    /// One request line in, at most one response out. Blank lines and
    /// notifications produce nothing.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let rid = next_rid();

        if line.len() > self.cfg.max_msg_bytes {
            tracing::warn!(
                event = "limit_exceeded",
                rid = %rid,
                bytes_in = line.len(),
                max = self.cfg.max_msg_bytes,
            );
            return Some(JsonRpcResponse::ok(
                None,
                serde_json::json!({
                    "error": {
                        "code": "E_LIMIT_EXCEEDED",
                        "message": format!("message bytes={} > max={}", line.len(), self.cfg.max_msg_bytes),
                    }
                }),
            ));
        }

        if line.trim().is_empty() {
            return None;
        }

        let req: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(event = "json_parse_error", rid = %rid, error = %e);
                return Some(JsonRpcResponse::error(None, PARSE_ERROR, format!("parse error: {}", e)));
            }
        };

        if req.method.starts_with("notifications/") {
            tracing::debug!(event = "notification", rid = %rid, method = %req.method);
            return None;
        }

        let start = Instant::now();
        tracing::info!(event = "request_start", rid = %rid, rpc_id = ?req.id, method = %req.method);

        let budget = Duration::from_millis(self.cfg.timeout_ms);
        let outcome = match timeout(budget, self.dispatch(&req)).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(
                    event = "request_timeout",
                    rid = %rid,
                    method = %req.method,
                    duration_ms = start.elapsed().as_millis() as u64,
                );
                Ok(serde_json::json!({
                    "error": {
                        "code": "E_TIMEOUT",
                        "message": format!("request exceeded {}ms", self.cfg.timeout_ms),
                    }
                }))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let resp = match outcome {
            Ok(result) => {
                let code = result
                    .pointer("/error/code")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                tracing::info!(
                    event = "request_done",
                    rid = %rid,
                    method = %req.method,
                    duration_ms,
                    outcome = if code.is_empty() { "ok" } else { "app_error" },
                    code,
                );
                JsonRpcResponse::ok(req.id.clone(), result)
            }
            Err(MethodError { code, message }) => {
                tracing::info!(
                    event = "request_rejected",
                    rid = %rid,
                    method = %req.method,
                    duration_ms,
                    code,
                );
                JsonRpcResponse::error(req.id.clone(), code, message)
            }
        };
        Some(resp)
    }

    async fn dispatch(&self, req: &JsonRpcRequest) -> Result<Value, MethodError> {
        let params = req.params.as_ref();
        match req.method.as_str() {
            "initialize" => Ok(methods::initialize()),
            "query" => methods::query(&self.router, params).await,
            "history" => methods::history(&self.router),
            "train" => methods::train(&self.router, params),
            other => Err(MethodError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {}", other),
            }),
        }
    }
}
