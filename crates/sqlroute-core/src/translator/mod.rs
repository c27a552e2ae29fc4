//! Natural language to SQL.

use crate::executor::rewrite::tokenize;
use crate::providers::llm::LlmClient;
use anyhow::Context;
use async_trait::async_trait;
use sqlparser::tokenizer::Token;
use std::sync::Arc;

pub mod prompt;

#[async_trait]
pub trait Translator: Send + Sync {
    /// Returns one SQL statement for `question`. `schema` describes the
    /// tables and datasets the statement may reference.
    async fn translate(&self, question: &str, schema: &str) -> anyhow::Result<String>;
    fn name(&self) -> &str;
}

/// Translator backed by a chat/completion model.
pub struct LlmTranslator {
    client: Arc<dyn LlmClient>,
}

impl LlmTranslator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, question: &str, schema: &str) -> anyhow::Result<String> {
        let prompt = prompt::build_prompt(question, schema);
        let resp = self
            .client
            .complete(&prompt)
            .await
            .with_context(|| format!("{} completion failed", self.client.provider_name()))?;
        tracing::debug!(
            event = "translator.completed",
            provider = %resp.provider,
            model = %resp.model,
            response_len = resp.text.len(),
        );
        normalize_sql(&resp.text)
    }

    fn name(&self) -> &str {
        self.client.provider_name()
    }
}

/// Cleans raw model output into a single-line statement. Code fences and
/// SQL comments are dropped and every run of whitespace becomes one space.
pub fn normalize_sql(raw: &str) -> anyhow::Result<String> {
    let body = raw
        .lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    let body = body.trim().trim_matches('`');

    let tokens = tokenize(body).context("translator returned unreadable SQL")?;
    let mut sql = String::new();
    let mut gap = false;
    for token in &tokens {
        // comments are whitespace tokens too
        if let Token::Whitespace(_) = token {
            gap = true;
            continue;
        }
        if gap && !sql.is_empty() {
            sql.push(' ');
        }
        gap = false;
        sql.push_str(&token.to_string());
    }

    if sql.is_empty() {
        anyhow::bail!("translator returned no SQL");
    }
    Ok(sql)
}
