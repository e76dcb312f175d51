//! Chat model clients used by the router and the answer synthesizer.
//!
//! Both backends issue a single non-streaming HTTP request per invocation. Timeouts are fixed
//! when the client is built; there are no retries.

use crate::config::{Config, ModelProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while invoking the language model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Model credentials or endpoint configuration are missing.
    #[error("Model client misconfigured: {0}")]
    Misconfigured(String),
    /// Provider could not be reached or timed out.
    #[error("Model provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Model request failed: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by chat completion backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `prompt` as a single user message and return the raw completion text.
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError>;

    /// Model identifier used for logging.
    fn model(&self) -> &str;
}

/// Build the chat model client for the current configuration.
pub fn get_chat_model(config: &Config) -> Result<Arc<dyn ChatModel>, ModelError> {
    let model: Arc<dyn ChatModel> = match config.llm_provider {
        ModelProvider::OpenAI => {
            let api_key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| ModelError::Misconfigured("OPENAI_API_KEY is not set".into()))?;
            Arc::new(OpenAiChatModel::new(
                config.openai_base_url.clone(),
                api_key,
                config.chat_model.clone(),
                config.chat_temperature,
                config.model_timeout(),
            )?)
        }
        ModelProvider::Ollama => Arc::new(OllamaChatModel::new(
            config.ollama_url.clone(),
            config.chat_model.clone(),
            config.chat_temperature,
            config.model_timeout(),
        )?),
    };
    tracing::info!(
        provider = ?config.llm_provider,
        model = %config.chat_model,
        timeout_secs = config.model_timeout_secs,
        "Chat model initialized"
    );
    Ok(model)
}

fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, ModelError> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|error| ModelError::Misconfigured(error.to_string()))
}

/// OpenAI `/chat/completions` client.
pub struct OpenAiChatModel {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    /// Construct a client bound to `base_url` (for example `https://api.openai.com/v1`).
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            http: build_http_client("policy-assistant/chat", timeout)?,
            base_url,
            api_key,
            model,
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ModelError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.endpoint()
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::GenerationFailed(format!("OpenAI returned {status}: {body}")));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            ModelError::InvalidResponse(format!("failed to decode OpenAI response: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::InvalidResponse("completion had no content".into()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Ollama `/api/generate` client.
pub struct OllamaChatModel {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaChatModel {
    /// Construct a client bound to the Ollama runtime at `base_url`.
    pub fn new(
        base_url: String,
        model: String,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            http: build_http_client("policy-assistant/ollama", timeout)?,
            base_url,
            model,
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ModelError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ModelError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::GenerationFailed(format!("Ollama returned {status}: {body}")));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            ModelError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(ModelError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use httpmock::{Method::POST, MockServer};

    fn openai(server: &MockServer) -> OpenAiChatModel {
        OpenAiChatModel::new(
            server.base_url(),
            "sk-test".into(),
            "gpt-4o-mini".into(),
            0.2,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn openai_returns_first_choice_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(r#"{"model": "gpt-4o-mini"}"#);
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "{\"route\": \"smalltalk\"}" } }
                    ]
                }));
            })
            .await;

        let raw = openai(&server).invoke("hello").await.expect("completion");

        mock.assert_async().await;
        assert_eq!(raw, "{\"route\": \"smalltalk\"}");
    }

    #[tokio::test]
    async fn openai_error_status_is_generation_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let error = openai(&server).invoke("hello").await.expect_err("error");
        assert!(matches!(error, ModelError::GenerationFailed(_)));
        assert!(error.to_string().contains("429"));
    }

    #[tokio::test]
    async fn openai_without_choices_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = openai(&server).invoke("hello").await.expect_err("error");
        assert!(matches!(error, ModelError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn ollama_returns_response_text_unmodified() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"stream": false}"#);
                then.status(200).json_body(json!({
                    "response": "  {\"answer\": \"ok\"}\n",
                    "done": true
                }));
            })
            .await;

        let client = OllamaChatModel::new(
            server.base_url(),
            "llama3".into(),
            0.2,
            Duration::from_secs(5),
        )
        .expect("client");
        let raw = client.invoke("prompt").await.expect("completion");

        mock.assert_async().await;
        assert_eq!(raw, "  {\"answer\": \"ok\"}\n");
    }

    #[test]
    fn openai_requires_api_key() {
        let mut config = test_config();
        config.openai_api_key = None;
        let error = get_chat_model(&config).err().expect("error");
        assert!(matches!(error, ModelError::Misconfigured(_)));
    }
}
