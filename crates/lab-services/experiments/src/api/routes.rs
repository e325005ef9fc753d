use crate::api::handlers::{
    compare_experiments, create_dataset, create_experiment, delete_dataset, delete_experiment,
    evaluate, get_experiment, health_check, list_datasets, list_experiments,
    list_model_parameters, list_models, record_results, train, update_model_parameters,
};
use crate::config::BridgeConfig;
use crate::db::LabStore;
use crate::service::TrainingService;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Application state for the experiments service.
pub struct AppState {
    /// Store shared by the CRUD handlers and the training bridge.
    pub store: Arc<dyn LabStore>,
    /// Train and evaluate orchestration.
    pub training: TrainingService,
}

impl AppState {
    pub fn new(store: Arc<dyn LabStore>, bridge: BridgeConfig) -> Self {
        let training = TrainingService::new(bridge, Arc::clone(&store));
        Self { store, training }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health::health_check,
        crate::api::handlers::datasets::list_datasets,
        crate::api::handlers::datasets::create_dataset,
        crate::api::handlers::datasets::delete_dataset,
        crate::api::handlers::models::list_models,
        crate::api::handlers::models::list_model_parameters,
        crate::api::handlers::models::update_model_parameters,
        crate::api::handlers::experiments::list_experiments,
        crate::api::handlers::experiments::get_experiment,
        crate::api::handlers::experiments::create_experiment,
        crate::api::handlers::experiments::record_results,
        crate::api::handlers::experiments::delete_experiment,
        crate::api::handlers::experiments::compare_experiments,
        crate::api::handlers::ml::train,
        crate::api::handlers::ml::evaluate,
    ),
    components(
        schemas(
            crate::api::dto::HealthResponse,
            crate::api::dto::MessageResponse,
            crate::api::dto::UpdateParametersRequest,
            crate::api::dto::UpdateParametersResponse,
            crate::api::dto::CompareRequest,
            crate::api::dto::TrainResponse,
            crate::api::dto::EvaluateResponse,
            crate::api::dto::RunFailureResponse,
            crate::models::Dataset,
            crate::models::NewDataset,
            crate::models::Model,
            crate::models::ModelParameter,
            crate::models::ParameterValue,
            crate::models::Experiment,
            crate::models::ExperimentStatus,
            crate::models::ExperimentRecord,
            crate::models::ExperimentSummary,
            crate::models::ExperimentDetail,
            crate::models::ExperimentParameter,
            crate::models::ExperimentResult,
            crate::models::NewExperiment,
            crate::models::ResultUpdate,
            crate::bridge::TrainingMetrics,
            crate::bridge::EvaluationMetrics,
            crate::bridge::TrainingOverrides,
            crate::service::TrainRequest,
            crate::service::EvaluateRequest,
            crate::service::ExperimentComparison,
            crate::service::comparison::ParameterDifference,
            crate::service::comparison::MetricComparison,
        )
    ),
    tags(
        (name = "experiments", description = "IDS experiment tracking and training bridge API")
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn create_router(store: Arc<dyn LabStore>, bridge: BridgeConfig) -> Router {
    let state = Arc::new(AppState::new(store, bridge));

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/datasets", get(list_datasets).post(create_dataset))
        .route("/datasets/:id", delete(delete_dataset))
        .route("/models", get(list_models))
        .route(
            "/models/:id/parameters",
            get(list_model_parameters).put(update_model_parameters),
        )
        .route("/experiments", get(list_experiments).post(create_experiment))
        .route("/experiments/compare", post(compare_experiments))
        .route(
            "/experiments/:id",
            get(get_experiment).delete(delete_experiment),
        )
        .route("/experiments/:id/results", put(record_results))
        .route("/ml/train", post(train))
        .route("/ml/evaluate", post(evaluate))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
