#![deny(missing_docs)]

//! Core library for the policy assistant: retrieval-augmented answers to company policy
//! questions, with citations.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Chat model abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Question-answering pipeline and assistant service.
pub mod pipeline;
/// Versioned prompt templates.
pub mod prompts;
/// Chunking, indexing, sanitization and context retrieval.
pub mod rag;
