//! Decoding and repair of the model's structured answer.

use serde_json::Value;
use thiserror::Error;

use super::types::{DEFAULT_CONFIDENCE, ParsedAnswer};

/// Number of retrieval citations copied into an answer that cited nothing.
pub const MAX_BACKFILL_CITATIONS: usize = 2;

/// Answer text returned when the model output cannot be decoded.
pub const FALLBACK_ANSWER: &str = "I could not produce a reliable answer from the policy documents. Please rephrase your question or contact HR.";

/// Why the model output could not be decoded into a [`ParsedAnswer`].
#[derive(Debug, Error)]
pub enum SynthesisParseFailure {
    /// Output was not valid JSON, even after removing a code fence.
    #[error("model output is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    /// Output was JSON but not an object.
    #[error("model output is not a JSON object")]
    NotAnObject,
    /// `answer` was missing or not a string.
    #[error("model output has no string 'answer' field")]
    MissingAnswer,
    /// `citations` was present but not a list of strings.
    #[error("model output 'citations' must be a list of strings")]
    InvalidCitations,
    /// `confidence` was present but not a number.
    #[error("model output 'confidence' must be a number")]
    InvalidConfidence,
    /// `confidence` was outside `[0, 1]`.
    #[error("model output confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// Decode raw model output into a [`ParsedAnswer`].
///
/// Accepts a bare JSON object or one wrapped in a Markdown code fence, which may follow a
/// preamble or sit on a single line. Unknown fields are ignored.
pub fn parse_answer(raw: &str) -> Result<ParsedAnswer, SynthesisParseFailure> {
    let value = decode_json(raw)?;
    let object = value.as_object().ok_or(SynthesisParseFailure::NotAnObject)?;

    let answer = object
        .get("answer")
        .and_then(Value::as_str)
        .ok_or(SynthesisParseFailure::MissingAnswer)?
        .to_string();

    let citations = match object.get("citations") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or(SynthesisParseFailure::InvalidCitations)?,
        Some(_) => return Err(SynthesisParseFailure::InvalidCitations),
    };

    let confidence = match object.get("confidence") {
        None => DEFAULT_CONFIDENCE,
        Some(value) => value
            .as_f64()
            .ok_or(SynthesisParseFailure::InvalidConfidence)?,
    };
    if !(0.0..=1.0).contains(&confidence) {
        return Err(SynthesisParseFailure::ConfidenceOutOfRange(confidence));
    }

    Ok(ParsedAnswer {
        answer,
        citations,
        confidence,
    })
}

/// Decode the output as JSON, falling back to the first Markdown code fence in it.
fn decode_json(raw: &str) -> Result<Value, serde_json::Error> {
    let trimmed = raw.trim();
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(err) => match fenced_body(trimmed) {
            Some(body) => serde_json::from_str(body),
            None => Err(err),
        },
    }
}

/// Body of the first code fence, anywhere in `text`, without its `json` tag.
///
/// An unterminated fence runs to the end of the text.
fn fenced_body(text: &str) -> Option<&str> {
    let (_, opened) = text.split_once("```")?;
    let body = opened.split_once("```").map_or(opened, |(body, _)| body);
    let body = body.strip_prefix("json").unwrap_or(body);
    Some(body.trim())
}

/// Fill an uncited answer with the leading retrieval citations.
///
/// Citations the model did supply are kept untouched, even when they match nothing retrieved.
pub fn repair_citations(mut answer: ParsedAnswer, retrieved: &[String]) -> ParsedAnswer {
    if answer.citations.is_empty() {
        answer.citations = retrieved
            .iter()
            .take(MAX_BACKFILL_CITATIONS)
            .cloned()
            .collect();
    }
    answer
}

/// Answer used when the model output could not be decoded.
pub fn fallback_answer() -> ParsedAnswer {
    ParsedAnswer {
        answer: FALLBACK_ANSWER.to_string(),
        citations: Vec::new(),
        confidence: 0.0,
    }
}
