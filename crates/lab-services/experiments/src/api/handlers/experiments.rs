use crate::api::dto::{CompareRequest, MessageResponse};
use crate::api::routes::AppState;
use crate::error::{ExperimentErrorExt, LabError, Result};
use crate::models::{
    Experiment, ExperimentDetail, ExperimentResult, ExperimentStatus, ExperimentSummary,
    NewExperiment, ResultUpdate,
};
use crate::service::{compare, experiment_detail, ExperimentComparison};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use tracing::info;

#[utoipa::path(
    get,
    path = "/api/experiments",
    responses(
        (status = 200, description = "Experiments with names and metrics, newest first", body = Vec<ExperimentSummary>)
    )
)]
pub async fn list_experiments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ExperimentSummary>>> {
    Ok(Json(state.store.list_experiments().await?))
}

#[utoipa::path(
    get,
    path = "/api/experiments/{id}",
    params(
        ("id" = i32, Path, description = "Experiment id")
    ),
    responses(
        (status = 200, description = "Experiment with parameters and result", body = ExperimentDetail),
        (status = 404, description = "Experiment not found")
    )
)]
pub async fn get_experiment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ExperimentDetail>> {
    let detail = experiment_detail(state.store.as_ref(), id).await?;
    Ok(Json(detail))
}

#[utoipa::path(
    post,
    path = "/api/experiments",
    request_body = NewExperiment,
    responses(
        (status = 201, description = "Experiment created in running state", body = Experiment),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn create_experiment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewExperiment>,
) -> Result<(StatusCode, Json<Experiment>)> {
    let experiment = state.store.create_experiment(&request).await?;
    info!(
        experiment_id = experiment.experiment_id,
        parameters = request.parameters.len(),
        "Experiment created"
    );

    Ok((StatusCode::CREATED, Json(experiment)))
}

/// Manual result entry: completes the experiment and stores the given metrics.
#[utoipa::path(
    put,
    path = "/api/experiments/{id}/results",
    params(
        ("id" = i32, Path, description = "Experiment id")
    ),
    request_body = ResultUpdate,
    responses(
        (status = 200, description = "Stored result", body = ExperimentResult),
        (status = 404, description = "Experiment not found")
    )
)]
pub async fn record_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(update): Json<ResultUpdate>,
) -> Result<Json<ExperimentResult>> {
    if state.store.get_experiment(id).await?.is_none() {
        return Err(LabError::experiment_not_found(id));
    }

    state
        .store
        .mark_terminal(id, ExperimentStatus::Completed)
        .await?;
    let result = state.store.upsert_result(id, &update).await?;

    Ok(Json(result))
}

#[utoipa::path(
    delete,
    path = "/api/experiments/{id}",
    params(
        ("id" = i32, Path, description = "Experiment id")
    ),
    responses(
        (status = 200, description = "Experiment deleted", body = MessageResponse),
        (status = 404, description = "Experiment not found")
    )
)]
pub async fn delete_experiment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>> {
    if !state.store.delete_experiment(id).await? {
        return Err(LabError::experiment_not_found(id));
    }

    Ok(Json(MessageResponse::new("Experiment deleted")))
}

#[utoipa::path(
    post,
    path = "/api/experiments/compare",
    request_body = CompareRequest,
    responses(
        (status = 200, description = "Side-by-side comparison", body = ExperimentComparison),
        (status = 400, description = "Both experiment ids are required"),
        (status = 404, description = "Experiment not found")
    )
)]
pub async fn compare_experiments(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<ExperimentComparison>> {
    let first_id = request
        .experiment_id_1
        .ok_or_else(|| LabError::missing_field("experiment_id_1"))?;
    let second_id = request
        .experiment_id_2
        .ok_or_else(|| LabError::missing_field("experiment_id_2"))?;

    let first = experiment_detail(state.store.as_ref(), first_id).await?;
    let second = experiment_detail(state.store.as_ref(), second_id).await?;

    Ok(Json(compare(first, second)))
}
