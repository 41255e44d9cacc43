use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    job::{JobError, JobInput, JobOutput},
    synth::Synthesizer,
};

#[derive(Clone)]
pub struct ApiState {
    pub synthesizer: Arc<Synthesizer>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    profiles: usize,
    archetypes: Vec<String>,
    engine: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
}

/// Job-queue request shape.
#[derive(Debug, Default, Deserialize)]
pub struct JobEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub input: JobInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Completed,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct JobEnvelopeResponse {
    pub id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobEnvelopeResponse {
    fn completed(id: String, output: JobOutput) -> Self {
        Self {
            id,
            status: JobStatus::Completed,
            output: Some(output),
            error: None,
        }
    }

    fn failed(id: String, error: String) -> Self {
        Self {
            id,
            status: JobStatus::Failed,
            output: None,
            error: Some(error),
        }
    }
}

#[instrument(skip(state))]
async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let catalog = state.synthesizer.catalog();
    Json(HealthResponse {
        status: "ok",
        profiles: catalog.len(),
        archetypes: catalog.archetypes().into_iter().map(str::to_string).collect(),
        engine: state.synthesizer.engine_label(),
    })
}

#[instrument(skip(state))]
async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let ready = state.synthesizer.engine_ready().await;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { ready }))
}

#[instrument(skip(state))]
async fn list_anchors(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.synthesizer.anchors())
}

#[instrument(skip(state, payload))]
async fn synthesize(
    State(state): State<ApiState>,
    payload: Result<Json<JobInput>, JsonRejection>,
) -> Result<Json<JobOutput>, JobError> {
    let Json(input) = payload.map_err(|rejection| JobError::invalid(rejection.body_text()))?;
    state.synthesizer.run(input).await.map(Json)
}

/// Always answers 200; failures travel inside the envelope.
#[instrument(skip(state, payload))]
async fn run_job(
    State(state): State<ApiState>,
    payload: Result<Json<JobEnvelope>, JsonRejection>,
) -> Json<JobEnvelopeResponse> {
    let envelope = match payload {
        Ok(Json(envelope)) => envelope,
        Err(rejection) => {
            let id = Uuid::new_v4().to_string();
            let error = rejection.body_text();
            warn!(target = "anchortts::api", job_id = %id, %error, "malformed job envelope");
            return Json(JobEnvelopeResponse::failed(id, error));
        }
    };

    let id = envelope
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    match state.synthesizer.run(envelope.input).await {
        Ok(output) => Json(JobEnvelopeResponse::completed(id, output)),
        Err(err) => {
            warn!(target = "anchortts::api", job_id = %id, %err, "job failed");
            Json(JobEnvelopeResponse::failed(id, err.to_string()))
        }
    }
}

pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/api/anchors", get(list_anchors))
        .route("/api/synthesize", post(synthesize))
        .route("/run", post(run_job))
        .with_state(state)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode as HyperStatus};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::{anchor_tree, synthesizer, MockEngine};

    fn test_app(engine: MockEngine) -> (Router, tempfile::TempDir) {
        let temp = tempfile::tempdir().unwrap();
        anchor_tree(temp.path());
        let synth = synthesizer(temp.path(), Arc::new(engine));
        let router = build_router(ApiState {
            synthesizer: Arc::new(synth),
        });
        (router, temp)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_catalog_and_engine() {
        let (app, _temp) = test_app(MockEngine::default());
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), HyperStatus::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["profiles"], 2);
        assert_eq!(body["engine"], "chatterbox");
        assert_eq!(
            body["archetypes"],
            serde_json::json!(["dark_manipulator", "wise_mentor"])
        );
    }

    #[tokio::test]
    async fn ready_follows_engine() {
        let (app, _temp) = test_app(MockEngine::not_ready());
        let response = app.oneshot(get_request("/ready")).await.unwrap();
        assert_eq!(response.status(), HyperStatus::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["ready"], false);
    }

    #[tokio::test]
    async fn anchors_are_listed() {
        let (app, _temp) = test_app(MockEngine::default());
        let response = app.oneshot(get_request("/api/anchors")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body[0]["profile_id"], "dm_male_01");
        assert_eq!(body[0]["has_reference"], true);
        assert_eq!(body[1]["has_reference"], false);
    }

    #[tokio::test]
    async fn synthesize_returns_anchored_audio() {
        let (app, _temp) = test_app(MockEngine::default());
        let response = app
            .oneshot(post_json(
                "/api/synthesize",
                serde_json::json!({
                    "text": "Everything is going according to plan.",
                    "archetype": "dark_manipulator",
                    "gender": "male"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), HyperStatus::OK);
        let body = json_body(response).await;
        assert_eq!(body["used_anchor"], "dm_male_01");
        assert_eq!(body["anchor_match"], "exact");
        assert_eq!(body["format"], "wav");
        assert_eq!(body["sample_rate"], 24000);
        assert!(body["audio_base64"].as_str().unwrap().len() > 16);
    }

    #[tokio::test]
    async fn synthesize_maps_errors_to_status() {
        let (app, _temp) = test_app(MockEngine::default());
        let response = app
            .clone()
            .oneshot(post_json("/api/synthesize", serde_json::json!({ "text": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), HyperStatus::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "text must not be empty");

        let response = app
            .clone()
            .oneshot(post_json("/api/synthesize", serde_json::json!({ "text": 5 })))
            .await
            .unwrap();
        assert_eq!(response.status(), HyperStatus::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert!(json_body(response).await["error"].is_string());

        let (failing, _temp) = test_app(MockEngine::failing("upstream exploded"));
        let response = failing
            .oneshot(post_json("/api/synthesize", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), HyperStatus::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn run_wraps_outcomes_in_envelope() {
        let (app, _temp) = test_app(MockEngine::default());
        let response = app
            .clone()
            .oneshot(post_json(
                "/run",
                serde_json::json!({ "id": "job-42", "input": { "text": "hi", "speed": 1.5 } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), HyperStatus::OK);
        let body = json_body(response).await;
        assert_eq!(body["id"], "job-42");
        assert_eq!(body["status"], "COMPLETED");
        assert_eq!(body["output"]["used_anchor"], "legacy");
        assert!(body.get("error").is_none());

        let response = app
            .clone()
            .oneshot(post_json(
                "/run",
                serde_json::json!({ "input": { "speed": 100.0 } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), HyperStatus::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "FAILED");
        assert!(body["error"].as_str().unwrap().contains("speed"));

        let malformed = Request::builder()
            .method("POST")
            .uri("/run")
            .header("content-type", "application/json")
            .body(Body::from("{ not json"))
            .unwrap();
        let response = app.oneshot(malformed).await.unwrap();
        assert_eq!(response.status(), HyperStatus::OK);
        assert_eq!(json_body(response).await["status"], "FAILED");
    }
}
