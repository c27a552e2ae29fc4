use super::LlmClient;
use crate::model::LlmResponse;
use async_trait::async_trait;
use serde_json::json;

pub const DEFAULT_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent";

/// Gemini `generateContent` client.
pub struct GeminiClient {
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    url_template: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(model: String, api_key: String, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            api_key,
            temperature,
            max_tokens,
            url_template: DEFAULT_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// `{model}` in `url` is replaced by the model name.
    pub fn with_url(mut self, url: &str) -> Self {
        self.url_template = url.to_string();
        self
    }

    pub fn url(&self) -> String {
        self.url_template.replace("{model}", &self.model)
    }

    fn body(&self, prompt: &str) -> serde_json::Value {
        json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            },
        })
    }
}

pub(crate) fn parse_generate_response(json: &serde_json::Value) -> anyhow::Result<String> {
    let candidates = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow::anyhow!("no candidates found in the response"))?;
    candidates[0]
        .pointer("/content/parts/0/text")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("first candidate has no text part"))
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.body(prompt))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("generateContent API error ({}): {}", status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        let text = parse_generate_response(&json)?;

        Ok(LlmResponse {
            text,
            provider: "gemini".to_string(),
            model: self.model.clone(),
            meta: json
                .get("usageMetadata")
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        })
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_first_candidate_text() {
        let v = json!({"candidates": [{"content": {"parts": [{"text": "SELECT * FROM users;"}]}}]});
        assert_eq!(parse_generate_response(&v).unwrap(), "SELECT * FROM users;");
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let err = parse_generate_response(&json!({"candidates": []})).unwrap_err();
        assert!(err.to_string().contains("no candidates"));
        assert!(parse_generate_response(&json!({"promptFeedback": {}})).is_err());
    }

    #[test]
    fn model_is_substituted_into_url() {
        let c = GeminiClient::new("gemini-1.5-flash".into(), "k".into(), 0.0, 256);
        assert!(c.url().ends_with("/models/gemini-1.5-flash:generateContent"));
    }
}
