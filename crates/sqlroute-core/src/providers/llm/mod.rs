use crate::config::{ProviderKind, TranslatorSettings};
use crate::model::LlmResponse;
use async_trait::async_trait;
use std::sync::Arc;

pub mod fake;
pub mod gemini;
pub mod openai;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse>;
    fn provider_name(&self) -> &'static str;
}

/// Builds the configured provider. Network providers need `api_key`.
pub fn from_settings(
    settings: &TranslatorSettings,
    api_key: Option<String>,
) -> anyhow::Result<Arc<dyn LlmClient>> {
    let model = settings.model_name();
    let client: Arc<dyn LlmClient> = match settings.provider {
        ProviderKind::Fake => {
            let mut fake = fake::FakeLlmClient::new(settings.fake_sql.clone());
            for rule in &settings.fake_rules {
                fake = fake.with_rule(&rule.contains, &rule.sql);
            }
            Arc::new(fake)
        }
        ProviderKind::OpenAi => {
            let key = require_key(api_key, settings)?;
            let mut c = openai::OpenAIClient::new(model, key, settings.temperature, settings.max_tokens);
            if let Some(url) = &settings.api_url {
                c = c.with_url(url);
            }
            Arc::new(c)
        }
        ProviderKind::Gemini => {
            let key = require_key(api_key, settings)?;
            let mut c = gemini::GeminiClient::new(model, key, settings.temperature, settings.max_tokens);
            if let Some(url) = &settings.api_url {
                c = c.with_url(url);
            }
            Arc::new(c)
        }
    };
    Ok(client)
}

fn require_key(api_key: Option<String>, settings: &TranslatorSettings) -> anyhow::Result<String> {
    api_key.ok_or_else(|| {
        anyhow::anyhow!(
            "{} provider needs an API key in ${}",
            settings.provider.as_str(),
            settings.api_key_env
        )
    })
}
