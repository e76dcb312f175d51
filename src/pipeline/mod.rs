//! Question-answering pipeline: classify, retrieve, synthesize, parse, repair and assemble.

pub mod answer;
pub mod assembler;
pub mod router;
pub mod service;
pub mod synthesizer;
pub mod types;

#[cfg(test)]
mod testing;

pub use answer::{
    FALLBACK_ANSWER, MAX_BACKFILL_CITATIONS, SynthesisParseFailure, fallback_answer, parse_answer,
    repair_citations,
};
pub use assembler::{
    RAW_PREVIEW_CHARS, SMALLTALK_ANSWER, assemble, assemble_fallback, raw_preview,
    smalltalk_response,
};
pub use router::{ClassificationFailure, QuestionRouter, decode_route};
pub use service::{AssistantApi, AssistantParts, PolicyAssistant};
pub use synthesizer::{AnswerSynthesizer, SynthesisError};
pub use types::{
    AskError, AskRequest, AskResponse, ConfigurationError, DEFAULT_CONFIDENCE, DebugPayload,
    HealthStatus, ParsedAnswer, Route, ValidationError,
};
