use crate::api::dto::{EvaluateResponse, RunFailureResponse, TrainResponse};
use crate::api::routes::AppState;
use crate::error::LabError;
use crate::service::{EvaluateRequest, TrainRequest};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

fn run_failure(message: &str, err: &LabError) -> Response {
    let status = match err {
        LabError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = RunFailureResponse {
        message: message.to_string(),
        error: err.detail(),
    };

    (status, Json(body)).into_response()
}

#[utoipa::path(
    post,
    path = "/api/ml/train",
    request_body = TrainRequest,
    responses(
        (status = 200, description = "Training completed", body = TrainResponse),
        (status = 409, description = "A run for this experiment is already in progress", body = RunFailureResponse),
        (status = 500, description = "Training failed", body = RunFailureResponse)
    )
)]
pub async fn train(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRequest>,
) -> Response {
    match state.training.train(request).await {
        Ok(outcome) => Json(TrainResponse::from(outcome)).into_response(),
        Err(err) => run_failure("Training failed", &err),
    }
}

#[utoipa::path(
    post,
    path = "/api/ml/evaluate",
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Evaluation completed", body = EvaluateResponse),
        (status = 500, description = "Evaluation failed", body = RunFailureResponse)
    )
)]
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EvaluateRequest>,
) -> Response {
    match state.training.evaluate(request).await {
        Ok(outcome) => Json(EvaluateResponse::from(outcome)).into_response(),
        Err(err) => run_failure("Evaluation failed", &err),
    }
}
