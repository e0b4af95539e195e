use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::warn;

use hostline_core::config::{LlmConfig, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
const ERROR_BODY_LIMIT: usize = 200;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Completion client for the providers `llm.provider` accepts.
pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        if matches!(config.provider, LlmProvider::OpenAi | LlmProvider::Anthropic)
            && config.api_key.is_none()
        {
            bail!("llm provider `{}` requires llm.api_key", config.provider.as_str());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            client,
            provider: config.provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::Ollama => format!("{}/api/generate", self.base_url),
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
            LlmProvider::Anthropic => format!("{}/v1/messages", self.base_url),
        }
    }

    pub fn request_body(&self, prompt: &str) -> Value {
        match self.provider {
            LlmProvider::Ollama => json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "format": "json",
            }),
            LlmProvider::OpenAi => json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": 0.0,
                "response_format": { "type": "json_object" },
            }),
            LlmProvider::Anthropic => json!({
                "model": self.model,
                "max_tokens": MAX_TOKENS,
                "messages": [{ "role": "user", "content": prompt }],
            }),
        }
    }

    async fn send_once(&self, prompt: &str) -> Result<String> {
        let mut request = self.client.post(self.endpoint()).json(&self.request_body(prompt));
        match (self.provider, &self.api_key) {
            (LlmProvider::OpenAi, Some(key)) => {
                request = request.bearer_auth(key.expose_secret());
            }
            (LlmProvider::Anthropic, Some(key)) => {
                request = request
                    .header("x-api-key", key.expose_secret())
                    .header("anthropic-version", ANTHROPIC_VERSION);
            }
            _ => {}
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("{} request failed", self.provider.as_str()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "{} returned {status}: {}",
                self.provider.as_str(),
                truncate(&body, ERROR_BODY_LIMIT)
            );
        }

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("{} response was not JSON", self.provider.as_str()))?;
        completion_text(self.provider, &body)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(error) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.request.retry",
                        provider = self.provider.as_str(),
                        attempt,
                        error = %error,
                        "llm request failed, retrying"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }
}

pub fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Ollama => "http://localhost:11434",
        LlmProvider::OpenAi => "https://api.openai.com/v1",
        LlmProvider::Anthropic => "https://api.anthropic.com",
    }
}

/// Pulls the generated text out of a provider response body.
pub fn completion_text(provider: LlmProvider, body: &Value) -> Result<String> {
    let text = match provider {
        LlmProvider::Ollama => body["response"].as_str().map(str::to_string),
        LlmProvider::OpenAi => body["choices"][0]["message"]["content"].as_str().map(str::to_string),
        LlmProvider::Anthropic => body["content"].as_array().map(|blocks| {
            blocks
                .iter()
                .filter(|block| block["type"] == "text")
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        }),
    };

    text.filter(|text| !text.trim().is_empty())
        .ok_or_else(|| anyhow!("{} response carried no completion text", provider.as_str()))
}

fn truncate(body: &str, limit: usize) -> &str {
    match body.char_indices().nth(limit) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;

    use hostline_core::config::{LlmConfig, LlmProvider};

    use super::{completion_text, HttpLlmClient};

    fn config(provider: LlmProvider, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            enabled: true,
            provider,
            api_key: api_key.map(|key| SecretString::from(key.to_string())),
            base_url: None,
            model: "test-model".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn hosted_providers_require_an_api_key() {
        assert!(HttpLlmClient::from_config(&config(LlmProvider::OpenAi, None)).is_err());
        assert!(HttpLlmClient::from_config(&config(LlmProvider::Anthropic, None)).is_err());
        assert!(HttpLlmClient::from_config(&config(LlmProvider::Ollama, None)).is_ok());
    }

    #[test]
    fn endpoints_follow_provider_and_base_url() {
        let ollama = HttpLlmClient::from_config(&config(LlmProvider::Ollama, None)).expect("client");
        assert_eq!(ollama.endpoint(), "http://localhost:11434/api/generate");

        let mut custom = config(LlmProvider::OpenAi, Some("sk-test"));
        custom.base_url = Some("http://llm.internal:8080/v1/".to_string());
        let openai = HttpLlmClient::from_config(&custom).expect("client");
        assert_eq!(openai.endpoint(), "http://llm.internal:8080/v1/chat/completions");

        let anthropic =
            HttpLlmClient::from_config(&config(LlmProvider::Anthropic, Some("key"))).expect("client");
        assert_eq!(anthropic.endpoint(), "https://api.anthropic.com/v1/messages");
        assert_eq!(anthropic.request_body("hi")["max_tokens"], 1024);
    }

    #[test]
    fn completion_text_is_read_per_provider() {
        let ollama = json!({ "response": "{\"commitments\":[]}" });
        assert_eq!(completion_text(LlmProvider::Ollama, &ollama).expect("text"), "{\"commitments\":[]}");

        let openai = json!({ "choices": [{ "message": { "role": "assistant", "content": "{}" } }] });
        assert_eq!(completion_text(LlmProvider::OpenAi, &openai).expect("text"), "{}");

        let anthropic = json!({
            "content": [
                { "type": "text", "text": "{\"commitments\":" },
                { "type": "tool_use", "id": "x" },
                { "type": "text", "text": "[]}" }
            ]
        });
        assert_eq!(
            completion_text(LlmProvider::Anthropic, &anthropic).expect("text"),
            "{\"commitments\":[]}"
        );

        assert!(completion_text(LlmProvider::OpenAi, &json!({ "choices": [] })).is_err());
    }
}
