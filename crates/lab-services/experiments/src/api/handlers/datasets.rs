use crate::api::dto::MessageResponse;
use crate::api::routes::AppState;
use crate::error::{ExperimentErrorExt, LabError, Result};
use crate::models::{Dataset, NewDataset};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use tracing::info;

#[utoipa::path(
    get,
    path = "/api/datasets",
    responses(
        (status = 200, description = "Datasets, newest upload first", body = Vec<Dataset>)
    )
)]
pub async fn list_datasets(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Dataset>>> {
    let datasets = state.store.list_datasets().await?;
    Ok(Json(datasets))
}

#[utoipa::path(
    post,
    path = "/api/datasets",
    request_body = NewDataset,
    responses(
        (status = 201, description = "Dataset registered", body = Dataset),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn create_dataset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewDataset>,
) -> Result<(StatusCode, Json<Dataset>)> {
    if request.filename.trim().is_empty() {
        return Err(LabError::missing_field("filename"));
    }

    let dataset = state.store.create_dataset(&request).await?;
    info!(dataset_id = dataset.dataset_id, filename = %dataset.filename, "Dataset registered");

    Ok((StatusCode::CREATED, Json(dataset)))
}

#[utoipa::path(
    delete,
    path = "/api/datasets/{id}",
    params(
        ("id" = i32, Path, description = "Dataset id")
    ),
    responses(
        (status = 200, description = "Dataset deleted", body = MessageResponse),
        (status = 404, description = "Dataset not found")
    )
)]
pub async fn delete_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>> {
    if !state.store.delete_dataset(id).await? {
        return Err(LabError::dataset_not_found(id));
    }

    Ok(Json(MessageResponse::new("Dataset deleted")))
}
