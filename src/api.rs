//! HTTP surface for the policy assistant.
//!
//! - `GET /` – Service description, endpoint catalog and an example request.
//! - `GET /health` – Liveness check returning `{"status": "ok"}`.
//! - `GET /ask` – Usage hint; questions must be POSTed.
//! - `POST /ask` – Answer a policy question. Accepts `question` plus optional `prompt_version`
//!   and `top_k`, and returns the structured answer with its route, retrieved chunk count and
//!   debug payload.
//!
//! Errors are returned as `{"detail": "..."}`: 422 for invalid input, 500 for retrieval
//! failures and 502 when the language model fails.

use crate::pipeline::{AskError, AskRequest, AskResponse, AssistantApi, HealthStatus};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the HTTP router exposing the assistant.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: AssistantApi + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root::<S>))
        .route("/health", get(health))
        .route("/ask", get(ask_hint).post(ask::<S>))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Descriptor for a single endpoint in the catalog served at `/`.
#[derive(Serialize)]
struct EndpointDescriptor {
    method: &'static str,
    path: &'static str,
    description: &'static str,
}

/// Response body for `GET /`.
#[derive(Serialize)]
struct RootResponse {
    message: String,
    version: &'static str,
    description: &'static str,
    endpoints: Vec<EndpointDescriptor>,
    example_request: serde_json::Value,
}

/// Describe the service and its endpoints.
async fn root<S>(State(service): State<Arc<S>>) -> Json<RootResponse>
where
    S: AssistantApi,
{
    Json(RootResponse {
        message: service.service_name().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        description: "Answers company policy questions from the indexed corpus, with citations.",
        endpoints: vec![
            EndpointDescriptor {
                method: "GET",
                path: "/health",
                description: "Health check.",
            },
            EndpointDescriptor {
                method: "POST",
                path: "/ask",
                description: "Ask a policy question: {question, prompt_version?, top_k? (1-20)}.",
            },
        ],
        example_request: json!({
            "url": "/ask",
            "method": "POST",
            "body": {
                "question": "What is the leave policy?",
                "prompt_version": "v2",
                "top_k": 5
            }
        }),
    })
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::ok())
}

/// Questions must be POSTed; point callers at the right shape.
async fn ask_hint() -> Json<serde_json::Value> {
    Json(json!({
        "detail": "Use POST to ask a question: POST /ask with body {\"question\": \"your question\", \"prompt_version\": \"v2\", \"top_k\": 5}"
    }))
}

/// Answer a question.
async fn ask<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError>
where
    S: AssistantApi,
{
    let Json(request) = payload?;
    let response = service.ask(request).await?;
    Ok(Json(response))
}

enum AppError {
    Ask(AskError),
    Rejection(JsonRejection),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Ask(error) => {
                let status = match &error {
                    AskError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    AskError::Retrieval(_) | AskError::Prompt(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    AskError::UpstreamModel(_) => StatusCode::BAD_GATEWAY,
                };
                (status, error.to_string())
            }
            Self::Rejection(rejection) => (rejection.status(), rejection.body_text()),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<AskError> for AppError {
    fn from(inner: AskError) -> Self {
        Self::Ask(inner)
    }
}

impl From<JsonRejection> for AppError {
    fn from(inner: JsonRejection) -> Self {
        Self::Rejection(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::llm::ModelError;
    use crate::pipeline::{
        AskError, AskRequest, AskResponse, AssistantApi, ParsedAnswer, Route, ValidationError,
    };
    use crate::rag::{IndexError, RetrievalError};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    enum Outcome {
        Answer,
        Invalid,
        IndexDown,
        ModelDown,
    }

    struct StubAssistant {
        outcome: Outcome,
        calls: Arc<Mutex<Vec<AskRequest>>>,
    }

    impl StubAssistant {
        fn new(outcome: Outcome) -> Self {
            Self {
                outcome,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl AssistantApi for StubAssistant {
        async fn ask(&self, request: AskRequest) -> Result<AskResponse, AskError> {
            self.calls.lock().await.push(request.clone());
            match self.outcome {
                Outcome::Answer => Ok(AskResponse {
                    answer: ParsedAnswer {
                        answer: "12 days".into(),
                        citations: vec!["leave.txt#chunk=0".into()],
                        confidence: 0.9,
                    },
                    prompt_version: request.prompt_version.unwrap_or_else(|| "v2".into()),
                    route: Route::PolicyQa,
                    retrieved_chunks: 4,
                    debug: Default::default(),
                }),
                Outcome::Invalid => Err(ValidationError::TopKOutOfRange {
                    requested: 21,
                    max: 20,
                }
                .into()),
                Outcome::IndexDown => Err(RetrievalError::Index(IndexError::Empty).into()),
                Outcome::ModelDown => {
                    Err(ModelError::ProviderUnavailable("connection refused".into()).into())
                }
            }
        }

        fn service_name(&self) -> &str {
            "Policy Assistant"
        }
    }

    async fn send(
        service: StubAssistant,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let app = create_router(Arc::new(service));
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = send(
            StubAssistant::new(Outcome::Answer),
            Method::GET,
            "/health",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn root_describes_endpoints() {
        let (status, body) =
            send(StubAssistant::new(Outcome::Answer), Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Policy Assistant");
        assert_eq!(body["example_request"]["body"]["top_k"], 5);
        assert!(
            body["endpoints"]
                .as_array()
                .unwrap()
                .iter()
                .any(|endpoint| endpoint["path"] == "/ask" && endpoint["method"] == "POST")
        );
    }

    #[tokio::test]
    async fn get_ask_returns_usage_hint() {
        let (status, body) = send(
            StubAssistant::new(Outcome::Answer),
            Method::GET,
            "/ask",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["detail"].as_str().unwrap().contains("POST /ask"));
    }

    #[tokio::test]
    async fn post_ask_forwards_request_and_returns_answer() {
        let service = StubAssistant::new(Outcome::Answer);
        let calls = service.calls.clone();
        let (status, body) = send(
            service,
            Method::POST,
            "/ask",
            Some(json!({ "question": "Leave?", "prompt_version": "v1", "top_k": 3 })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"]["answer"], "12 days");
        assert_eq!(body["answer"]["citations"], json!(["leave.txt#chunk=0"]));
        assert_eq!(body["prompt_version"], "v1");
        assert_eq!(body["route"], "policy_qa");
        assert_eq!(body["retrieved_chunks"], 4);

        let calls = calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].question, "Leave?");
        assert_eq!(calls[0].top_k, Some(3));
    }

    #[tokio::test]
    async fn errors_map_to_status_codes_with_detail() {
        let cases = [
            (Outcome::Invalid, StatusCode::UNPROCESSABLE_ENTITY),
            (Outcome::IndexDown, StatusCode::INTERNAL_SERVER_ERROR),
            (Outcome::ModelDown, StatusCode::BAD_GATEWAY),
        ];
        for (outcome, expected) in cases {
            let (status, body) = send(
                StubAssistant::new(outcome),
                Method::POST,
                "/ask",
                Some(json!({ "question": "Leave?" })),
            )
            .await;
            assert_eq!(status, expected);
            assert!(body["detail"].is_string());
        }
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_with_detail() {
        let service = StubAssistant::new(Outcome::Answer);
        let calls = service.calls.clone();
        let (status, body) = send(
            service,
            Method::POST,
            "/ask",
            Some(json!({ "prompt_version": "v2" })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("question"));
        assert!(calls.lock().await.is_empty());
    }
}
