use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::catalog::ParameterValue;
use crate::bridge::metrics::{EvaluationMetrics, TrainingMetrics};

/// Lifecycle of an experiment. `Running` only while a process is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize, ToSchema)]
#[sqlx(type_name = "experiment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Running,
    Completed,
    Failed,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Running => "running",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExperimentStatus::Running)
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Experiment {
    pub experiment_id: i32,
    pub model_id: Option<i32>,
    pub dataset_id: Option<i32>,
    pub notes: Option<String>,
    pub status: ExperimentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// An experiment joined with the names of its model and dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ExperimentRecord {
    pub experiment_id: i32,
    pub model_id: Option<i32>,
    pub dataset_id: Option<i32>,
    pub notes: Option<String>,
    pub status: ExperimentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub model_name: Option<String>,
    pub dataset_name: Option<String>,
}

/// Row of the experiment listing: record plus headline metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ExperimentSummary {
    pub experiment_id: i32,
    pub model_id: Option<i32>,
    pub dataset_id: Option<i32>,
    pub notes: Option<String>,
    pub status: ExperimentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub model_name: Option<String>,
    pub dataset_name: Option<String>,
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1_score: Option<f64>,
    pub runtime: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ExperimentParameter {
    pub experiment_id: i32,
    pub param_name: String,
    pub param_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ExperimentResult {
    pub result_id: i32,
    pub experiment_id: i32,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Formatted duration such as `"12.34 seconds"`.
    pub runtime: Option<String>,
}

/// An experiment with its parameters and result row, as served by the
/// detail endpoint and used for comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExperimentDetail {
    #[serde(flatten)]
    pub record: ExperimentRecord,
    pub parameters: Vec<ExperimentParameter>,
    pub results: Option<ExperimentResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewExperiment {
    pub model_id: Option<i32>,
    pub dataset_id: Option<i32>,
    pub notes: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterValue>,
}

/// Values written by a result upsert.
///
/// A `None` metric is stored as 0 when the row is inserted and leaves the
/// stored value untouched when the row already exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResultUpdate {
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1_score: Option<f64>,
    pub runtime: Option<String>,
}

impl ResultUpdate {
    pub fn from_training(metrics: &TrainingMetrics, runtime: impl Into<String>) -> Self {
        Self {
            accuracy: Some(metrics.accuracy),
            precision: Some(metrics.precision),
            recall: Some(metrics.recall),
            f1_score: Some(metrics.f1_score),
            runtime: Some(runtime.into()),
        }
    }

    pub fn from_evaluation(metrics: &EvaluationMetrics) -> Self {
        Self {
            accuracy: metrics.accuracy,
            precision: metrics.precision,
            recall: metrics.recall,
            f1_score: metrics.f1_score,
            runtime: None,
        }
    }

    /// Applies this update on top of an existing result row.
    pub fn apply_to(&self, result: &mut ExperimentResult) {
        if let Some(v) = self.accuracy {
            result.accuracy = v;
        }
        if let Some(v) = self.precision {
            result.precision = v;
        }
        if let Some(v) = self.recall {
            result.recall = v;
        }
        if let Some(v) = self.f1_score {
            result.f1_score = v;
        }
        if let Some(ref runtime) = self.runtime {
            result.runtime = Some(runtime.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ExperimentStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");

        let status: ExperimentStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, ExperimentStatus::Failed);
        assert!(status.is_terminal());
        assert!(!ExperimentStatus::Running.is_terminal());
    }

    #[test]
    fn test_partial_update_keeps_existing_values() {
        let mut result = ExperimentResult {
            result_id: 1,
            experiment_id: 9,
            accuracy: 0.9,
            precision: 0.8,
            recall: 0.7,
            f1_score: 0.75,
            runtime: Some("10.00 seconds".to_string()),
        };

        let update = ResultUpdate {
            accuracy: Some(0.95),
            ..Default::default()
        };
        update.apply_to(&mut result);

        assert_eq!(result.accuracy, 0.95);
        assert_eq!(result.precision, 0.8);
        assert_eq!(result.runtime.as_deref(), Some("10.00 seconds"));
    }

    #[test]
    fn test_from_training_fills_every_field() {
        let metrics = TrainingMetrics {
            accuracy: 0.95,
            precision: 0.93,
            recall: 0.91,
            f1_score: 0.92,
        };
        let update = ResultUpdate::from_training(&metrics, "3.50 seconds");
        assert_eq!(update.precision, Some(0.93));
        assert_eq!(update.runtime.as_deref(), Some("3.50 seconds"));
    }
}
