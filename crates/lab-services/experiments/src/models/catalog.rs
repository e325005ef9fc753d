//! Datasets, models and their tunable parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Dataset {
    pub dataset_id: i32,
    pub filename: String,
    pub source: Option<String>,
    pub feature_count: Option<i32>,
    pub label_count: Option<i32>,
    pub upload_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewDataset {
    pub filename: String,
    pub source: Option<String>,
    pub feature_count: Option<i32>,
    pub label_count: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Model {
    pub model_id: i32,
    pub model_name: String,
    pub model_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ModelParameter {
    pub param_id: i32,
    pub model_id: i32,
    pub param_name: String,
    pub param_value: Option<String>,
    pub param_type: Option<String>,
    pub description: Option<String>,
}

/// A named parameter value, as stored for models and experiments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ParameterValue {
    pub param_name: String,
    pub param_value: String,
}

impl ParameterValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            param_name: name.into(),
            param_value: value.into(),
        }
    }
}
