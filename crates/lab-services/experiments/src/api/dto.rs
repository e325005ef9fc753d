use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::bridge::{EvaluationMetrics, TrainingMetrics};
use crate::models::ParameterValue;
use crate::service::{EvaluateOutcome, TrainOutcome};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateParametersRequest {
    pub parameters: Vec<ParameterValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateParametersResponse {
    pub message: String,
    pub updated: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CompareRequest {
    #[serde(default)]
    pub experiment_id_1: Option<i32>,
    #[serde(default)]
    pub experiment_id_2: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrainResponse {
    pub message: String,
    pub output: String,
    pub model_path: String,
    pub metrics: TrainingMetrics,
    pub runtime: String,
}

impl From<TrainOutcome> for TrainResponse {
    fn from(outcome: TrainOutcome) -> Self {
        Self {
            message: "Training completed".to_string(),
            output: outcome.output,
            model_path: outcome.model_path,
            metrics: outcome.metrics,
            runtime: outcome.runtime,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EvaluateResponse {
    pub message: String,
    pub output: String,
    pub metrics: EvaluationMetrics,
}

impl From<EvaluateOutcome> for EvaluateResponse {
    fn from(outcome: EvaluateOutcome) -> Self {
        Self {
            message: "Evaluation completed".to_string(),
            output: outcome.output,
            metrics: outcome.metrics,
        }
    }
}

/// Body returned when a bridged train or evaluate run fails. `error` carries
/// the process output for a failed process, otherwise the error message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunFailureResponse {
    pub message: String,
    pub error: String,
}
