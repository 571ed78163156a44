#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    error::{RepositoryError, ServiceError},
    service::EvaluationService,
};

/// Body of `POST /evaluate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    /// Submission to evaluate.
    pub submission_id: String,
}

/// Maps a service error onto a status code and JSON body. A failed
/// evaluation is a 500 the client may retry; it is never reported as a low
/// score.
fn error_response(error: ServiceError) -> Response {
    match error {
        ServiceError::Repository(
            e @ (RepositoryError::SubmissionNotFound(_) | RepositoryError::ChallengeNotFound(_)),
        ) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response(),
        ServiceError::Repository(e) => {
            warn!("storage failure: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string(), "retryable": true })),
            )
                .into_response()
        }
        ServiceError::Evaluation(failure) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": failure.to_string(),
                "kind": failure.error.kind(),
                "state": failure.state,
                "retryable": failure.retryable(),
            })),
        )
            .into_response(),
    }
}

/// `POST /evaluate`
async fn evaluate_handler(
    State(service): State<EvaluationService>,
    Json(request): Json<EvaluateRequest>,
) -> Response {
    match service.evaluate(&request.submission_id).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /health`
async fn health_handler(State(service): State<EvaluationService>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "pool": service.pool_stats(),
    }))
}

/// Builds the HTTP surface. Stored screenshots are served under the
/// configured base URL when persistence is enabled.
pub fn router(service: EvaluationService) -> Router {
    let config = service.evaluator().config();
    let base = config.screenshot_base_url.clone();
    let screenshots = config
        .screenshot_dir
        .clone()
        .filter(|_| base.len() > 1 && base.starts_with('/'))
        .map(|dir| (base, dir));

    let mut router = Router::new()
        .route("/evaluate", post(evaluate_handler))
        .route("/health", get(health_handler));

    if let Some((base, dir)) = screenshots {
        router = router.nest_service(&base, ServeDir::new(dir));
    }

    router.layer(TraceLayer::new_for_http()).with_state(service)
}

/// Serves the HTTP surface on `addr` until the process is stopped.
pub async fn serve(service: EvaluationService, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, router(service))
        .await
        .context("HTTP server stopped unexpectedly")
}
