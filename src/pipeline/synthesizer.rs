//! Grounded answer generation from the retrieved context.

use crate::{
    llm::{ChatModel, ModelError},
    prompts::{PromptError, PromptKind, PromptLibrary, PromptTemplate},
};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while producing raw answer text.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// QA template could not be loaded or rendered.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// Model call failed.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Renders the versioned QA prompt and invokes the model once.
pub struct AnswerSynthesizer {
    prompts: PromptLibrary,
    model: Arc<dyn ChatModel>,
}

impl AnswerSynthesizer {
    /// Create a synthesizer reading templates from `prompts`.
    pub fn new(prompts: PromptLibrary, model: Arc<dyn ChatModel>) -> Self {
        Self { prompts, model }
    }

    /// Load `policy_qa_<version>.txt`.
    ///
    /// Templates are read on every call so edits on disk apply to the next request.
    pub async fn template(&self, version: &str) -> Result<PromptTemplate, PromptError> {
        self.prompts.load(PromptKind::PolicyQa, version).await
    }

    /// Render `template` and return the model's raw output unmodified.
    pub async fn synthesize_with(
        &self,
        template: &PromptTemplate,
        question: &str,
        context: &str,
    ) -> Result<String, SynthesisError> {
        let prompt = template.render(&[("question", question), ("context", context)])?;
        tracing::debug!(
            template = template.name(),
            model = self.model.model(),
            prompt_chars = prompt.chars().count(),
            "Invoking answer model"
        );
        Ok(self.model.invoke(&prompt).await?)
    }

    /// Load the template for `prompt_version`, render it and invoke the model.
    pub async fn synthesize(
        &self,
        question: &str,
        context: &str,
        prompt_version: &str,
    ) -> Result<String, SynthesisError> {
        let template = self.template(prompt_version).await?;
        self.synthesize_with(&template, question, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::ScriptedModel;
    use std::fs;

    fn library() -> (tempfile::TempDir, PromptLibrary) {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("policy_qa_v2.txt"),
            "Context:\n{context}\n\nQuestion: {question}\nJSON {{\"answer\": \"...\"}}",
        )
        .expect("write");
        let library = PromptLibrary::new(dir.path());
        (dir, library)
    }

    #[tokio::test]
    async fn returns_raw_output_and_renders_both_placeholders() {
        let (_dir, library) = library();
        let model = ScriptedModel::new(["  raw {not json}  "]);
        let prompts = model.prompts();
        let synthesizer = AnswerSynthesizer::new(library, Arc::new(model));

        let raw = synthesizer
            .synthesize("How many days?", "[leave.txt#chunk=0]\n12 days", "v2")
            .await
            .expect("synthesize");

        assert_eq!(raw, "  raw {not json}  ");
        let prompts = prompts.lock().await;
        assert_eq!(
            prompts[0],
            "Context:\n[leave.txt#chunk=0]\n12 days\n\nQuestion: How many days?\nJSON {\"answer\": \"...\"}"
        );
    }

    #[tokio::test]
    async fn unknown_version_is_a_prompt_error() {
        let (_dir, library) = library();
        let synthesizer = AnswerSynthesizer::new(library, Arc::new(ScriptedModel::new(["{}"])));
        let error = synthesizer.synthesize("q", "c", "v7").await.unwrap_err();
        assert!(matches!(error, SynthesisError::Prompt(PromptError::NotFound(_))));
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let (_dir, library) = library();
        let synthesizer = AnswerSynthesizer::new(library, Arc::new(ScriptedModel::failing()));
        let error = synthesizer.synthesize("q", "c", "v2").await.unwrap_err();
        assert!(matches!(error, SynthesisError::Model(_)));
    }
}
