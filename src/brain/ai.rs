//! # brain::ai — calls DeepSeek, OpenAI or Claude
//!
//! The provider is picked by `AI_PROVIDER`. DeepSeek speaks the OpenAI chat
//! completions dialect, so both share one request path.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AiProvider, Config};

const INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TOKENS: u32 = 1024;

/// Inference collaborator: one system prompt plus one user prompt in,
/// free text out. The reply is opaque until `brain::parse` looks at it.
#[async_trait]
pub trait Inference: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

// ─── ChatClient ───────────────────────────────────────────────────────────────

pub struct ChatClient {
    http:     reqwest::Client,
    provider: AiProvider,
    api_key:  String,
    model:    String,
    base_url: String,
}

impl ChatClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        let base_url = config
            .ai_base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.ai_provider).to_string());

        Self {
            http,
            provider: config.ai_provider,
            api_key:  config.ai_api_key.clone(),
            model:    config.ai_model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn default_base_url(provider: AiProvider) -> &'static str {
    match provider {
        AiProvider::DeepSeek => "https://api.deepseek.com",
        AiProvider::OpenAi   => "https://api.openai.com/v1",
        AiProvider::Claude   => "https://api.anthropic.com/v1",
    }
}

#[async_trait]
impl Inference for ChatClient {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        match self.provider {
            AiProvider::Claude => self.call_claude(system, user).await,
            AiProvider::OpenAi | AiProvider::DeepSeek => self.call_chat_completions(system, user).await,
        }
    }
}

// ─── Anthropic Claude ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model:      &'a str,
    max_tokens: u32,
    system:     &'a str,
    messages:   Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    #[serde(default)]
    text: String,
}

impl ChatClient {
    async fn call_claude(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let body = ClaudeRequest {
            model:      &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages:   vec![ChatMessage { role: "user", content: user }],
        };

        debug!(model = %self.model, "Calling Claude API...");

        let resp = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .timeout(INFERENCE_TIMEOUT)
            .send()
            .await
            .context("Claude API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Claude API error {status}: {text}");
        }

        let data: ClaudeResponse = resp.json().await.context("Claude response parse error")?;

        data.content
            .into_iter()
            .map(|c| c.text)
            .find(|t| !t.is_empty())
            .context("Claude returned empty content")
    }
}

// ─── OpenAI-compatible chat completions ───────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model:    &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream:   bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role:    &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMsg,
}

#[derive(Deserialize)]
struct ChatChoiceMsg {
    content: Option<String>,
}

impl ChatClient {
    async fn call_chat_completions(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let body = ChatRequest {
            model:    &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user",   content: user },
            ],
            stream:   false,
        };

        debug!(provider = %self.provider, model = %self.model, "Calling chat completions API...");

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(INFERENCE_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("{} API request failed", self.provider))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} API error {status}: {text}", self.provider);
        }

        let data: ChatResponse = resp
            .json()
            .await
            .with_context(|| format!("{} response parse error", self.provider))?;

        data.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .with_context(|| format!("{} returned empty content", self.provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(provider: &str, base_url: &str) -> Config {
        let env = HashMap::from([
            ("OKX_API_KEY", "k".to_string()),
            ("OKX_SECRET", "s".to_string()),
            ("OKX_PASSWORD", "p".to_string()),
            ("AI_API_KEY", "sk-test".to_string()),
            ("AI_PROVIDER", provider.to_string()),
            ("AI_BASE_URL", base_url.to_string()),
        ]);
        Config::from_lookup(|k| env.get(k).cloned()).unwrap()
    }

    #[tokio::test]
    async fn test_deepseek_uses_chat_completions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "{\"direction\":\"HOLD\"}" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(reqwest::Client::new(), &config("deepseek", &server.uri()));
        let reply = client.complete("sys", "user").await.unwrap();
        assert_eq!(reply, "{\"direction\":\"HOLD\"}");
    }

    #[tokio::test]
    async fn test_claude_uses_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{ "type": "text", "text": "hello" }]
            })))
            .mount(&server)
            .await;

        let client = ChatClient::new(reqwest::Client::new(), &config("claude", &server.uri()));
        assert_eq!(client.complete("sys", "user").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_http_error_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = ChatClient::new(reqwest::Client::new(), &config("openai", &server.uri()));
        let err = client.complete("sys", "user").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_empty_choice_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = ChatClient::new(reqwest::Client::new(), &config("deepseek", &server.uri()));
        assert!(client.complete("sys", "user").await.is_err());
    }
}
