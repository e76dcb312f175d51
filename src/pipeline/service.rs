//! Assistant service coordinating routing, retrieval, synthesis and response assembly.

use crate::{
    config::Config,
    embedding::get_embedding_client,
    llm::get_chat_model,
    prompts::{PromptError, PromptLibrary, validate_version},
    rag::{ContextRetriever, LocalIndex, MAX_TOP_K, Sanitizer},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    answer::{parse_answer, repair_citations},
    assembler::{assemble, assemble_fallback, smalltalk_response},
    router::QuestionRouter,
    synthesizer::{AnswerSynthesizer, SynthesisError},
    types::{AskError, AskRequest, AskResponse, ConfigurationError, Route, ValidationError},
};

/// Abstraction over the assistant used by the HTTP surface.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Answer a single question.
    async fn ask(&self, request: AskRequest) -> Result<AskResponse, AskError>;

    /// Human readable service name.
    fn service_name(&self) -> &str;
}

/// Components a [`PolicyAssistant`] is assembled from.
pub struct AssistantParts {
    /// Service name reported by `GET /`.
    pub app_name: String,
    /// Question classifier.
    pub router: QuestionRouter,
    /// Context retriever over the loaded index.
    pub retriever: ContextRetriever,
    /// Answer generator.
    pub synthesizer: AnswerSynthesizer,
    /// Prompt version used when a request omits one.
    pub default_prompt_version: String,
    /// Neighbour count used when a request omits one.
    pub default_top_k: usize,
}

/// Request input after validation and defaulting.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ValidatedAsk {
    question: String,
    prompt_version: String,
    top_k: usize,
}

/// The question-answering service.
///
/// Built once at startup and shared through an `Arc`; it holds no mutable state, so requests
/// run fully independently.
pub struct PolicyAssistant {
    app_name: String,
    router: QuestionRouter,
    retriever: ContextRetriever,
    synthesizer: AnswerSynthesizer,
    default_prompt_version: String,
    default_top_k: usize,
}

impl PolicyAssistant {
    /// Assemble the service from prebuilt components.
    pub fn new(parts: AssistantParts) -> Self {
        let AssistantParts {
            app_name,
            router,
            retriever,
            synthesizer,
            default_prompt_version,
            default_top_k,
        } = parts;
        Self {
            app_name,
            router,
            retriever,
            synthesizer,
            default_prompt_version,
            default_top_k,
        }
    }

    /// Build every component from `config`.
    ///
    /// Fails when model credentials are missing, the index is absent or unusable, the router
    /// template is missing, or the default QA template is missing.
    pub async fn from_config(config: &Config) -> Result<Self, ConfigurationError> {
        tracing::info!("Initializing embedding client");
        let embedder = get_embedding_client(config)?;
        let index = LocalIndex::load(&config.index_dir, embedder)?;

        let sanitizer = match &config.injection_patterns_file {
            Some(path) => Sanitizer::with_pattern_file(path)?,
            None => Sanitizer::default(),
        };
        let retriever = ContextRetriever::new(
            Arc::new(index),
            Arc::new(sanitizer),
            config.max_context_chars,
        );

        let model = get_chat_model(config)?;
        let prompts = PromptLibrary::new(&config.prompts_dir);
        let router = QuestionRouter::load(&prompts, &config.router_version, model.clone()).await?;
        let synthesizer = AnswerSynthesizer::new(prompts, model);
        synthesizer.template(&config.prompt_version).await?;

        tracing::info!(
            router_version = %config.router_version,
            prompt_version = %config.prompt_version,
            default_top_k = config.default_top_k,
            "Policy assistant ready"
        );

        Ok(Self::new(AssistantParts {
            app_name: config.app_name.clone(),
            router,
            retriever,
            synthesizer,
            default_prompt_version: config.prompt_version.clone(),
            default_top_k: config.default_top_k,
        }))
    }

    fn validate(&self, request: AskRequest) -> Result<ValidatedAsk, ValidationError> {
        if request.question.trim().is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }

        let top_k = match request.top_k {
            None => self.default_top_k,
            Some(requested) => usize::try_from(requested)
                .ok()
                .filter(|k| (1..=MAX_TOP_K).contains(k))
                .ok_or(ValidationError::TopKOutOfRange {
                    requested,
                    max: MAX_TOP_K,
                })?,
        };

        let prompt_version = request
            .prompt_version
            .unwrap_or_else(|| self.default_prompt_version.clone());
        if validate_version(&prompt_version).is_err() {
            return Err(ValidationError::InvalidPromptVersion(prompt_version));
        }

        Ok(ValidatedAsk {
            question: request.question,
            prompt_version,
            top_k,
        })
    }

    async fn answer(&self, ask: ValidatedAsk) -> Result<AskResponse, AskError> {
        let route = self.router.route(&ask.question).await;
        tracing::info!(route = %route, "question_routed");
        if route == Route::Smalltalk {
            return Ok(smalltalk_response(&ask.prompt_version));
        }

        let template = match self.synthesizer.template(&ask.prompt_version).await {
            Ok(template) => template,
            Err(PromptError::NotFound(_)) => {
                return Err(ValidationError::UnknownPromptVersion(ask.prompt_version).into());
            }
            Err(error) => return Err(error.into()),
        };

        let retrieval = self.retriever.retrieve(&ask.question, ask.top_k).await?;
        tracing::info!(
            top_k = ask.top_k,
            retrieved = retrieval.retrieved_count(),
            context_chars = retrieval.context.chars().count(),
            "context_retrieved"
        );

        let raw = self
            .synthesizer
            .synthesize_with(&template, &ask.question, &retrieval.context)
            .await?;

        let response = match parse_answer(&raw) {
            Ok(parsed) => assemble(
                route,
                repair_citations(parsed, &retrieval.citations()),
                retrieval.retrieved_count(),
                &raw,
                &ask.prompt_version,
            ),
            Err(failure) => {
                tracing::warn!(error = %failure, "Unparseable model answer; returning fallback");
                assemble_fallback(
                    route,
                    &failure,
                    retrieval.retrieved_count(),
                    &raw,
                    &ask.prompt_version,
                )
            }
        };
        Ok(response)
    }
}

impl From<SynthesisError> for AskError {
    fn from(error: SynthesisError) -> Self {
        match error {
            SynthesisError::Prompt(error) => Self::Prompt(error),
            SynthesisError::Model(error) => Self::UpstreamModel(error),
        }
    }
}

#[async_trait]
impl AssistantApi for PolicyAssistant {
    async fn ask(&self, request: AskRequest) -> Result<AskResponse, AskError> {
        let span = tracing::info_span!("ask", request_id = %Uuid::new_v4());
        async move {
            tracing::info!(
                prompt_version = ?request.prompt_version,
                top_k = ?request.top_k,
                "ask_request"
            );
            let started = Instant::now();

            let ask = match self.validate(request) {
                Ok(ask) => ask,
                Err(error) => {
                    tracing::warn!(error = %error, "Rejected ask request");
                    return Err(error.into());
                }
            };

            match self.answer(ask).await {
                Ok(response) => {
                    tracing::info!(
                        route = %response.route,
                        retrieved_chunks = response.retrieved_chunks,
                        citations = response.answer.citations.len(),
                        confidence = response.answer.confidence,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "ask_completed"
                    );
                    Ok(response)
                }
                Err(error) => {
                    tracing::error!(
                        error = %error,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Ask request failed"
                    );
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    fn service_name(&self) -> &str {
        &self.app_name
    }
}
