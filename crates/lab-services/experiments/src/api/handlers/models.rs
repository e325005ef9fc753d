use crate::api::dto::{UpdateParametersRequest, UpdateParametersResponse};
use crate::api::routes::AppState;
use crate::error::Result;
use crate::models::{Model, ModelParameter};
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/api/models",
    responses(
        (status = 200, description = "Registered models", body = Vec<Model>)
    )
)]
pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Model>>> {
    Ok(Json(state.store.list_models().await?))
}

#[utoipa::path(
    get,
    path = "/api/models/{id}/parameters",
    params(
        ("id" = i32, Path, description = "Model id")
    ),
    responses(
        (status = 200, description = "Tunable parameters of the model", body = Vec<ModelParameter>)
    )
)]
pub async fn list_model_parameters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<ModelParameter>>> {
    Ok(Json(state.store.list_model_parameters(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/models/{id}/parameters",
    params(
        ("id" = i32, Path, description = "Model id")
    ),
    request_body = UpdateParametersRequest,
    responses(
        (status = 200, description = "Parameters updated", body = UpdateParametersResponse)
    )
)]
pub async fn update_model_parameters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateParametersRequest>,
) -> Result<Json<UpdateParametersResponse>> {
    let updated = state
        .store
        .update_model_parameters(id, &request.parameters)
        .await?;

    Ok(Json(UpdateParametersResponse {
        message: "Parameters updated".to_string(),
        updated,
    }))
}
