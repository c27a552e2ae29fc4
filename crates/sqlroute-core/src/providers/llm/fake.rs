use super::LlmClient;
use crate::model::LlmResponse;
use crate::translator::prompt::extract_task;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Deterministic offline provider. Answers from substring rules on the
/// question, then the default SQL; counts every call.
#[derive(Debug, Default)]
pub struct FakeLlmClient {
    default_sql: Option<String>,
    rules: Vec<(String, String)>,
    calls: AtomicUsize,
    fail_first: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeLlmClient {
    pub fn new(default_sql: Option<String>) -> Self {
        Self {
            default_sql,
            ..Self::default()
        }
    }

    pub fn with_rule(mut self, contains: &str, sql: &str) -> Self {
        self.rules.push((contains.to_lowercase(), sql.to_string()));
        self
    }

    /// The next `n` calls fail.
    pub fn failing_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, question: &str) -> Option<&str> {
        let q = question.to_lowercase();
        self.rules
            .iter()
            .find(|(needle, _)| q.contains(needle.as_str()))
            .map(|(_, sql)| sql.as_str())
            .or(self.default_sql.as_deref())
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }

        let should_fail = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            anyhow::bail!("fake provider failure");
        }

        let question = extract_task(prompt);
        let text = self
            .answer(question)
            .ok_or_else(|| anyhow::anyhow!("no fake response for question: {}", question))?;

        Ok(LlmResponse {
            text: text.to_string(),
            provider: "fake".to_string(),
            model: "fake".to_string(),
            meta: serde_json::Value::Null,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
