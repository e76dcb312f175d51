//! Test doubles shared by the pipeline unit tests.

use crate::{
    llm::{ChatModel, ModelError},
    rag::{ChunkMetadata, IndexError, SearchHit, SimilaritySearch},
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

enum Reply {
    Text(String),
    Fail,
}

/// Chat model replaying canned outputs in order and recording every prompt.
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModel {
    pub(crate) fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_replies(replies.into_iter().map(|reply| Reply::Text(reply.into())))
    }

    pub(crate) fn failing() -> Self {
        Self::from_replies([Reply::Fail])
    }

    fn from_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        self.prompts.clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().await.push(prompt.to_string());
        match self.replies.lock().await.pop_front() {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail) => Err(ModelError::ProviderUnavailable("scripted failure".into())),
            None => Err(ModelError::InvalidResponse("no scripted reply left".into())),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Index returning fixed hits and counting queries.
pub(crate) struct StaticIndex {
    hits: Vec<SearchHit>,
    queries: Arc<AtomicUsize>,
}

impl StaticIndex {
    pub(crate) fn new(hits: &[(&str, usize, &str)]) -> Self {
        Self {
            hits: hits
                .iter()
                .map(|(source, chunk_index, text)| SearchHit {
                    text: text.to_string(),
                    metadata: ChunkMetadata {
                        source: source.to_string(),
                        chunk_index: *chunk_index,
                    },
                })
                .collect(),
            queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn queries(&self) -> Arc<AtomicUsize> {
        self.queries.clone()
    }
}

#[async_trait]
impl SimilaritySearch for StaticIndex {
    async fn similarity_search(
        &self,
        _query: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}
