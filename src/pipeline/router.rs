//! Question classification into small talk or policy QA.

use crate::{
    llm::{ChatModel, ModelError},
    prompts::{PromptError, PromptKind, PromptLibrary, PromptTemplate},
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use super::types::Route;

/// Reasons a classification attempt did not yield a route.
#[derive(Debug, Error)]
pub enum ClassificationFailure {
    /// Model call failed.
    #[error("router model call failed: {0}")]
    Model(#[from] ModelError),
    /// Router template could not be rendered.
    #[error("router prompt failed: {0}")]
    Prompt(#[from] PromptError),
    /// Output was not valid JSON.
    #[error("router output is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    /// Output was JSON but not an object.
    #[error("router output is not a JSON object")]
    NotAnObject,
    /// Object had no `route` field.
    #[error("router output has no 'route' field")]
    MissingRoute,
    /// `route` field was not a string.
    #[error("router output 'route' field is not a string")]
    NonStringRoute,
}

/// Classifies questions with a single model call.
pub struct QuestionRouter {
    template: PromptTemplate,
    model: Arc<dyn ChatModel>,
}

impl QuestionRouter {
    /// Wrap an already parsed router template.
    pub fn new(template: PromptTemplate, model: Arc<dyn ChatModel>) -> Self {
        Self { template, model }
    }

    /// Load `router_<version>.txt` from `library` and check that it renders with a question.
    pub async fn load(
        library: &PromptLibrary,
        version: &str,
        model: Arc<dyn ChatModel>,
    ) -> Result<Self, PromptError> {
        let template = library.load(PromptKind::Router, version).await?;
        template.render(&[("question", "")])?;
        tracing::info!(template = template.name(), "Router prompt loaded");
        Ok(Self::new(template, model))
    }

    /// Classify `question`, reporting why classification failed.
    pub async fn classify(&self, question: &str) -> Result<Route, ClassificationFailure> {
        let prompt = self.template.render(&[("question", question)])?;
        let raw = self.model.invoke(&prompt).await?;
        decode_route(&raw)
    }

    /// Classify `question`, treating every failure as [`Route::PolicyQa`].
    pub async fn route(&self, question: &str) -> Route {
        match self.classify(question).await {
            Ok(route) => route,
            Err(failure) => {
                tracing::warn!(error = %failure, "Question classification failed; using policy_qa");
                Route::PolicyQa
            }
        }
    }
}

/// Strictly decode router output of the form `{"route": "<label>"}`.
pub fn decode_route(raw: &str) -> Result<Route, ClassificationFailure> {
    let value: Value = serde_json::from_str(raw)?;
    let object = value.as_object().ok_or(ClassificationFailure::NotAnObject)?;
    match object.get("route") {
        Some(Value::String(label)) => Ok(Route::normalize(label)),
        Some(_) => Err(ClassificationFailure::NonStringRoute),
        None => Err(ClassificationFailure::MissingRoute),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::ScriptedModel;

    fn router(model: ScriptedModel) -> QuestionRouter {
        let template = PromptTemplate::parse(
            "router_v1.txt",
            "Classify: {question}\nReply {{\"route\": \"smalltalk\"|\"policy_qa\"}}",
        )
        .expect("template");
        QuestionRouter::new(template, Arc::new(model))
    }

    #[test]
    fn decodes_known_and_unknown_labels() {
        let cases = [
            (r#"{"route": "smalltalk"}"#, Route::Smalltalk),
            (r#"{"route": "policy_qa"}"#, Route::PolicyQa),
            (r#" {"route": "weather"} "#, Route::PolicyQa),
        ];
        for (raw, expected) in cases {
            assert_eq!(decode_route(raw).unwrap(), expected, "{raw}");
        }
    }

    #[test]
    fn rejects_malformed_shapes() {
        assert!(matches!(
            decode_route("smalltalk"),
            Err(ClassificationFailure::MalformedJson(_))
        ));
        assert!(matches!(
            decode_route(r#"["smalltalk"]"#),
            Err(ClassificationFailure::NotAnObject)
        ));
        assert!(matches!(
            decode_route(r#"{"label": "smalltalk"}"#),
            Err(ClassificationFailure::MissingRoute)
        ));
        assert!(matches!(
            decode_route(r#"{"route": 1}"#),
            Err(ClassificationFailure::NonStringRoute)
        ));
    }

    #[tokio::test]
    async fn renders_question_into_prompt() {
        let model = ScriptedModel::new([r#"{"route": "smalltalk"}"#]);
        let prompts = model.prompts();
        let route = router(model).route("hello there").await;

        assert_eq!(route, Route::Smalltalk);
        let prompts = prompts.lock().await;
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("Classify: hello there\n"));
        assert!(prompts[0].contains(r#"{"route": "smalltalk"|"policy_qa"}"#));
    }

    #[tokio::test]
    async fn failures_fall_open_to_policy_qa() {
        for raw in ["not json", "```json\n{\"route\": \"smalltalk\"}\n```", "{}", "null"] {
            let route = router(ScriptedModel::new([raw])).route("hi").await;
            assert_eq!(route, Route::PolicyQa, "{raw}");
        }

        let route = router(ScriptedModel::failing()).route("hi").await;
        assert_eq!(route, Route::PolicyQa);
    }

    #[tokio::test]
    async fn load_rejects_templates_with_unknown_placeholders() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("router_v1.txt"), "{question} {context}").expect("write");
        let library = PromptLibrary::new(dir.path());

        let error = QuestionRouter::load(&library, "v1", Arc::new(ScriptedModel::new(["{}"])))
            .await
            .err()
            .expect("error");
        assert!(matches!(error, PromptError::UnknownPlaceholder { .. }));
    }
}
