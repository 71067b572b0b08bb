//! Completion backend interface and the OpenAI-style HTTP client.
//!
//! Three logical operations are consumed — rephrase-and-classify, generate
//! SQL, check safety — each a synchronous text-in/structured-text-out call.
//! The core is agnostic to the model behind the endpoint.

mod requests;

pub use requests::{
    GenerateRequest, RephraseAnalysis, RephraseRequest, SafetyRequest, SafetyVerdict,
};

use crate::config::Config;
use crate::error::AssistantError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One prompt for the completion backend, already split into the fixed
/// instruction part and the per-call content.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: Prompt) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

/// Reqwest-backed client for a chat-completions endpoint.
pub struct ChatClient {
    backend_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    http_client: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: &Config) -> Self {
        Self {
            backend_url: config.completion_url.trim_end_matches('/').to_string(),
            model: config.completion_model.clone(),
            max_tokens: config.completion_max_tokens,
            temperature: config.completion_temperature,
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
                .build()
                .unwrap_or_default(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.backend_url)
    }
}

#[async_trait]
impl CompletionBackend for ChatClient {
    async fn complete(&self, prompt: Prompt) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: prompt.system },
                ChatMessage { role: "user".to_string(), content: prompt.user },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        };

        let response = self
            .http_client
            .post(self.completions_url())
            .json(&request)
            .send()
            .await
            .context("Completion request failed")?;

        if !response.status().is_success() {
            return Err(AssistantError::Generation(format!(
                "completion backend returned HTTP {}",
                response.status()
            ))
            .into());
        }

        let body: ChatCompletionResponse =
            response.json().await.context("Malformed completion response")?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .map(|message| message.content)
            .context("Completion response contained no choices")?;

        debug!("Completion returned {} chars", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    #[tokio::test]
    async fn test_chat_client_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"SELECT 1"}}]}"#,
            )
            .create_async()
            .await;

        let mut cfg = config::test_config();
        cfg.completion_url = server.url();
        let client = ChatClient::new(&cfg);

        let output = client
            .complete(Prompt { system: "s".into(), user: "u".into() })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(output, "SELECT 1");
    }

    #[tokio::test]
    async fn test_chat_client_empty_choices_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let mut cfg = config::test_config();
        cfg.completion_url = server.url();
        let client = ChatClient::new(&cfg);

        let result = client.complete(Prompt { system: "s".into(), user: "u".into() }).await;
        assert!(result.is_err());
    }
}
