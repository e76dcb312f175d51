//! Final response construction.

use serde_json::Value;

use super::answer::{SynthesisParseFailure, fallback_answer};
use super::types::{AskResponse, DebugPayload, ParsedAnswer, Route};

/// Characters of raw model output kept in `debug.raw_preview`.
pub const RAW_PREVIEW_CHARS: usize = 200;

/// Canned reply for small talk.
pub const SMALLTALK_ANSWER: &str =
    "I can help with company policy questions. Please ask your policy query.";

/// Confidence reported with the canned small-talk reply.
pub const SMALLTALK_CONFIDENCE: f64 = 0.5;

/// First [`RAW_PREVIEW_CHARS`] characters of `raw`.
pub fn raw_preview(raw: &str) -> String {
    raw.chars().take(RAW_PREVIEW_CHARS).collect()
}

fn preview_debug(raw: &str) -> DebugPayload {
    let mut debug = DebugPayload::new();
    debug.insert("raw_preview".into(), Value::String(raw_preview(raw)));
    debug
}

/// Build the response for a successfully parsed and repaired answer.
pub fn assemble(
    route: Route,
    answer: ParsedAnswer,
    retrieved_chunks: usize,
    raw: &str,
    prompt_version: &str,
) -> AskResponse {
    AskResponse {
        answer,
        prompt_version: prompt_version.to_string(),
        route,
        retrieved_chunks,
        debug: preview_debug(raw),
    }
}

/// Build the fallback response for model output that could not be parsed.
pub fn assemble_fallback(
    route: Route,
    failure: &SynthesisParseFailure,
    retrieved_chunks: usize,
    raw: &str,
    prompt_version: &str,
) -> AskResponse {
    let mut debug = preview_debug(raw);
    debug.insert("parse_error".into(), Value::String(failure.to_string()));
    AskResponse {
        answer: fallback_answer(),
        prompt_version: prompt_version.to_string(),
        route,
        retrieved_chunks,
        debug,
    }
}

/// Canned small-talk response; nothing is retrieved and no model answer is generated.
pub fn smalltalk_response(prompt_version: &str) -> AskResponse {
    AskResponse {
        answer: ParsedAnswer {
            answer: SMALLTALK_ANSWER.to_string(),
            citations: Vec::new(),
            confidence: SMALLTALK_CONFIDENCE,
        },
        prompt_version: prompt_version.to_string(),
        route: Route::Smalltalk,
        retrieved_chunks: 0,
        debug: DebugPayload::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::answer::parse_answer;

    #[test]
    fn preview_is_character_bounded() {
        let raw = "é".repeat(500);
        let response = assemble(
            Route::PolicyQa,
            parse_answer(r#"{"answer": "x"}"#).unwrap(),
            3,
            &raw,
            "v2",
        );
        let preview = response.debug["raw_preview"].as_str().unwrap();
        assert_eq!(preview.chars().count(), RAW_PREVIEW_CHARS);
        assert_eq!(response.retrieved_chunks, 3);
        assert_eq!(response.prompt_version, "v2");
    }

    #[test]
    fn short_output_is_previewed_whole() {
        assert_eq!(raw_preview("{\"answer\": \"x\"}"), "{\"answer\": \"x\"}");
    }

    #[test]
    fn fallback_records_parse_error() {
        let failure = parse_answer("plain text").unwrap_err();
        let response = assemble_fallback(Route::PolicyQa, &failure, 2, "plain text", "v1");

        assert_eq!(response.answer.confidence, 0.0);
        assert!(response.answer.citations.is_empty());
        assert_eq!(response.debug["raw_preview"], "plain text");
        assert!(
            response.debug["parse_error"]
                .as_str()
                .unwrap()
                .contains("not valid JSON")
        );
    }

    #[test]
    fn smalltalk_reply_is_canned() {
        let response = smalltalk_response("v2");
        assert_eq!(response.route, Route::Smalltalk);
        assert_eq!(response.answer.answer, SMALLTALK_ANSWER);
        assert_eq!(response.answer.confidence, SMALLTALK_CONFIDENCE);
        assert!(response.answer.citations.is_empty());
        assert_eq!(response.retrieved_chunks, 0);
        assert!(response.debug.is_empty());
    }
}
