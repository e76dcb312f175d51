//! Request/response shapes and error taxonomy for the question-answering pipeline.

use crate::{
    config::ConfigError,
    embedding::EmbeddingClientError,
    llm::ModelError,
    prompts::PromptError,
    rag::{IndexError, RetrievalError, sanitize::SanitizerError},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Confidence assumed when the model omits one.
pub const DEFAULT_CONFIDENCE: f64 = 0.6;

/// Free-form diagnostics attached to a response.
pub type DebugPayload = Map<String, Value>;

/// Structured answer returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAnswer {
    /// Answer text.
    pub answer: String,
    /// Citation labels in `source#chunk=N` form.
    #[serde(default)]
    pub citations: Vec<String>,
    /// Model-reported confidence in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

/// Coarse classification of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Greeting or chit-chat; answered with a canned reply.
    Smalltalk,
    /// Anything that should go through retrieval and synthesis.
    PolicyQa,
}

impl Route {
    /// Map a router label onto a route. Only the exact label `smalltalk` is small talk.
    pub fn normalize(label: &str) -> Self {
        if label == "smalltalk" {
            Self::Smalltalk
        } else {
            Self::PolicyQa
        }
    }

    /// Wire label of the route.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Smalltalk => "smalltalk",
            Self::PolicyQa => "policy_qa",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /ask`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskRequest {
    /// Question text; must not be blank.
    pub question: String,
    /// QA prompt version; the configured default applies when omitted.
    #[serde(default)]
    pub prompt_version: Option<String>,
    /// Number of chunks to retrieve; the configured default applies when omitted.
    #[serde(default)]
    pub top_k: Option<i64>,
}

impl AskRequest {
    /// Convenience constructor for a question with default settings.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }
}

/// Response body of `POST /ask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    /// Final answer after parsing and citation repair.
    pub answer: ParsedAnswer,
    /// Prompt version used for this request.
    pub prompt_version: String,
    /// Route chosen by the classifier.
    pub route: Route,
    /// Number of chunks retrieved for the answer.
    pub retrieved_chunks: usize,
    /// Diagnostics such as a preview of the raw model output.
    #[serde(default)]
    pub debug: DebugPayload,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Always `ok` while the process is serving.
    pub status: String,
}

impl HealthStatus {
    /// Healthy status.
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
        }
    }
}

/// Request input rejected before any retrieval.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Question was empty or whitespace only.
    #[error("question must not be empty")]
    EmptyQuestion,
    /// `top_k` outside the accepted range.
    #[error("top_k must be between 1 and {max}, got {requested}")]
    TopKOutOfRange {
        /// Value supplied by the caller.
        requested: i64,
        /// Largest accepted value.
        max: usize,
    },
    /// Prompt version contains disallowed characters.
    #[error("prompt_version '{0}' is not a valid version name")]
    InvalidPromptVersion(String),
    /// No template exists for the requested prompt version.
    #[error("prompt_version '{0}' is not available")]
    UnknownPromptVersion(String),
}

/// Errors returned by [`crate::pipeline::AssistantApi::ask`].
#[derive(Debug, Error)]
pub enum AskError {
    /// Caller supplied invalid input.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Index or query embedding failed.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
    /// Chat model transport, status or decoding failure.
    #[error("Upstream model error: {0}")]
    UpstreamModel(#[from] ModelError),
    /// A prompt template on disk could not be rendered.
    #[error("Prompt template error: {0}")]
    Prompt(#[from] PromptError),
}

/// Fatal problems detected while assembling the service at startup.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Environment variables are missing or invalid.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Index is missing, corrupt or built with another model.
    #[error("Index unavailable: {0}")]
    Index(#[from] IndexError),
    /// Required prompt template is missing or malformed.
    #[error("Prompt template unavailable: {0}")]
    Prompt(#[from] PromptError),
    /// Chat model client could not be built.
    #[error("Chat model unavailable: {0}")]
    Model(#[from] ModelError),
    /// Embedding client could not be built.
    #[error("Embedding client unavailable: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Injection patterns could not be loaded.
    #[error("Injection patterns unavailable: {0}")]
    Sanitizer(#[from] SanitizerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn route_normalization_only_accepts_exact_smalltalk() {
        assert_eq!(Route::normalize("smalltalk"), Route::Smalltalk);
        for label in ["policy_qa", "SmallTalk", "chitchat", ""] {
            assert_eq!(Route::normalize(label), Route::PolicyQa, "{label}");
        }
    }

    #[test]
    fn route_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_value(Route::PolicyQa).unwrap(),
            json!("policy_qa")
        );
        assert_eq!(
            serde_json::to_value(Route::Smalltalk).unwrap(),
            json!("smalltalk")
        );
    }

    #[test]
    fn ask_request_defaults_optional_fields() {
        let request: AskRequest =
            serde_json::from_value(json!({ "question": "What is the leave policy?" })).unwrap();
        assert_eq!(request.prompt_version, None);
        assert_eq!(request.top_k, None);
    }

    #[test]
    fn response_uses_snake_case_field_names() {
        let response = AskResponse {
            answer: ParsedAnswer {
                answer: "12 days".into(),
                citations: vec!["leave.txt#chunk=0".into()],
                confidence: 0.8,
            },
            prompt_version: "v2".into(),
            route: Route::PolicyQa,
            retrieved_chunks: 1,
            debug: DebugPayload::new(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["answer"]["citations"][0], "leave.txt#chunk=0");
        assert_eq!(value["prompt_version"], "v2");
        assert_eq!(value["route"], "policy_qa");
        assert_eq!(value["retrieved_chunks"], 1);
        assert_eq!(value["debug"], json!({}));
    }
}
