//! Error handling for the experiments service.
//!
//! Uses `lab_error::LabError` as the unified error type with feature-gated
//! conversions for sqlx and axum.

pub use lab_error::{LabError, Result};

/// Extension trait for experiment-specific error construction
pub trait ExperimentErrorExt {
    /// Creates an experiment not found error
    fn experiment_not_found(id: i32) -> LabError {
        LabError::not_found("experiment", id.to_string())
    }

    /// Creates a dataset not found error
    fn dataset_not_found(id: i32) -> LabError {
        LabError::not_found("dataset", id.to_string())
    }

    /// Creates a missing required field error
    fn missing_field(field: &str) -> LabError {
        LabError::invalid_input(field, "field is required")
    }

    /// Creates an error for a second concurrent run of the same experiment
    fn run_in_progress(id: i32) -> LabError {
        LabError::conflict(format!("experiment {id} already has a run in progress"))
    }
}

impl ExperimentErrorExt for LabError {}
