use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use prosody_protocol::{build_prompt, parse_reply, GenerateRequest, DEFAULT_ENDPOINT_PATH};

use crate::error::ApiError;
use crate::model::ProsodyModel;

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn ProsodyModel>,
}

impl AppState {
    pub fn new(model: Arc<dyn ProsodyModel>) -> Self {
        Self { model }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(
            DEFAULT_ENDPOINT_PATH,
            post(generate_prosody).fallback(method_not_allowed),
        )
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn generate_prosody(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Ok(Json(request)) = body else {
        return Err(ApiError::MissingText);
    };
    let text = request.prompt_text().ok_or(ApiError::MissingText)?;

    info!("Directing {} chars of text", text.chars().count());
    let start = std::time::Instant::now();

    let reply = state.model.generate(&build_prompt(&text)).await?;
    debug!("Model reply: {}", reply);

    // Passed through as parsed; clients check the shape before speaking.
    let directions = parse_reply(&reply)?;
    match directions.as_array() {
        Some(segments) => info!("Generated {} segments in {:?}", segments.len(), start.elapsed()),
        None => warn!("Model reply is not an array, passing it through"),
    }

    Ok(Json(directions))
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use prosody_protocol::{ErrorResponse, ProsodyParams, Segment};
    use tower::ServiceExt;

    use crate::model::ModelError;

    /// Replies with a canned result and remembers the prompts it saw.
    struct StubModel {
        reply: Result<&'static str, &'static str>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubModel {
        fn replying(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn blocked(reason: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(reason),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ProsodyModel for StubModel {
        async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.reply {
                Ok(reply) => Ok(reply.to_string()),
                Err(reason) => Err(ModelError::Blocked(reason.to_string())),
            }
        }
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(DEFAULT_ENDPOINT_PATH)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(model: Arc<StubModel>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let app = create_router(AppState::new(model));
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn error_message(body: &[u8]) -> String {
        serde_json::from_slice::<ErrorResponse>(body).unwrap().error
    }

    #[tokio::test]
    async fn returns_segments_from_fenced_reply() {
        let model = StubModel::replying(
            "```json\n[{\"segment\": \"Oh no,\", \"params\": {\"pitch\": 0.6, \"rate\": 0.85, \"volume\": 0.7}}]\n```",
        );
        let (status, body) = send(model.clone(), post_json(r#"{"text": "Oh no, not again"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        let segments: Vec<Segment> = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            segments,
            vec![Segment::new("Oh no,", ProsodyParams::new(0.6, 0.85, 0.7))]
        );

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("Text: \"Oh no, not again\""));
    }

    #[tokio::test]
    async fn non_post_is_method_not_allowed() {
        let request = Request::builder()
            .method("GET")
            .uri(DEFAULT_ENDPOINT_PATH)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(StubModel::replying("[]"), request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(error_message(&body), "Method Not Allowed");
    }

    #[tokio::test]
    async fn missing_text_is_bad_request() {
        for body in [
            r#"{}"#,
            r#"{"text": ""}"#,
            r#"{"text": null}"#,
            r#"{"text": 0}"#,
            r#"{"text": false}"#,
            "not json",
        ] {
            let model = StubModel::replying("[]");
            let (status, response) = send(model.clone(), post_json(body)).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(error_message(&response), "Text is required in the request body.");
            assert!(model.prompts.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn model_failure_is_generic_server_error() {
        let (status, body) = send(StubModel::blocked("SAFETY"), post_json(r#"{"text": "hi"}"#)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_message(&body), "Failed to generate speech prosody.");
    }

    #[tokio::test]
    async fn non_array_reply_passes_through_unchanged() {
        let reply = r#"{"segments": [{"segment": "a"}]}"#;
        let (status, body) = send(StubModel::replying(reply), post_json(r#"{"text": "a"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::from_str::<Value>(reply).unwrap());
    }

    #[tokio::test]
    async fn reply_fields_are_kept() {
        let reply = "```json\n[{\"segment\": \"sigh\", \"params\": {\"pitch\": null, \"rate\": 0.8}, \"emotion\": \"sad\"}]\n```";
        let (status, body) = send(StubModel::replying(reply), post_json(r#"{"text": "sigh"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            json!([{"segment": "sigh", "params": {"pitch": null, "rate": 0.8}, "emotion": "sad"}])
        );
    }

    #[tokio::test]
    async fn truthy_non_string_text_reaches_the_model() {
        let model = StubModel::replying("[]");
        let (status, _) = send(model.clone(), post_json(r#"{"text": 42}"#)).await;

        assert_eq!(status, StatusCode::OK);
        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("Text: \"42\""));
    }

    #[tokio::test]
    async fn multibyte_text_is_forwarded_intact() {
        let model = StubModel::replying("[]");
        let (status, _) = send(model.clone(), post_json(r#"{"text": "¡Qué sorpresa! 🎉"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(model.prompts.lock().unwrap()[0].ends_with("Text: \"¡Qué sorpresa! 🎉\""));
    }

    #[tokio::test]
    async fn cors_preflight_allows_any_origin() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri(DEFAULT_ENDPOINT_PATH)
            .header("origin", "https://speech.example.com")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let app = create_router(AppState::new(StubModel::replying("[]")));
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        let methods = headers["access-control-allow-methods"].to_str().unwrap();
        assert!(methods.contains("POST"), "allow-methods: {methods}");
        let allowed = headers["access-control-allow-headers"].to_str().unwrap();
        assert!(allowed.contains("content-type"), "allow-headers: {allowed}");
    }

    #[tokio::test]
    async fn cors_post_carries_allow_origin() {
        let mut request = post_json(r#"{"text": "hi"}"#);
        request
            .headers_mut()
            .insert("origin", "https://speech.example.com".parse().unwrap());
        let app = create_router(AppState::new(StubModel::replying("[]")));
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn unparseable_reply_is_generic_server_error() {
        let model = StubModel::replying("Here you go: segment one, segment two.");
        let (status, body) = send(model, post_json(r#"{"text": "hi"}"#)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_message(&body), "Failed to generate speech prosody.");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(StubModel::replying("[]"), request).await;

        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
    }
}
