//! # IDS Lab Error Handling
//!
//! This crate provides the unified error type for the IDS experiment lab.
//! It uses `thiserror` for the error definitions and plugs into the service
//! stack through optional features.
//!
//! ## Features
//!
//! - **`sqlx`**: conversion from `sqlx::Error` and `MigrateError` into [`LabError::Database`]
//! - **`axum`**: [`LabError`] implements `IntoResponse` with a JSON body
//!
//! ## Usage
//!
//! ```rust
//! use lab_error::{LabError, Result};
//!
//! fn load() -> Result<String> {
//!     Err(LabError::ConfigLoad("configs/base.yaml: not found".to_string()))
//! }
//!
//! assert!(load().unwrap_err().to_string().contains("base.yaml"));
//! ```

use thiserror::Error;

/// Exit code recorded when a child process could not be started or was
/// terminated by a signal.
pub const LAUNCH_FAILURE_CODE: i32 = -1;

/// The main error type for the lab services.
#[derive(Error, Debug)]
pub enum LabError {
    /// Service configuration errors (bad env values, missing fields)
    #[error("configuration error: {0}")]
    Config(String),

    /// Base run configuration document missing or unparsable
    #[error("failed to load run configuration: {0}")]
    ConfigLoad(String),

    /// External process could not be started
    #[error("failed to launch process: {0}")]
    ProcessLaunch(String),

    /// External process ran but exited unsuccessfully
    #[error("process exited with code {code}: {output}")]
    ProcessExit { code: i32, output: String },

    /// Operation deadline exceeded
    #[error("timeout: {0}")]
    Timeout(String),

    /// Database errors (connection failures, query errors, etc.)
    #[error("database error: {0}")]
    Database(String),

    /// IO errors (file operations, pipes, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors (JSON, YAML)
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Resource not found errors
    #[error("{resource_type} not found: {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    /// Invalid input validation errors
    #[error("invalid input for field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    /// Conflicting concurrent operation
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal errors (bugs, unexpected states, etc.)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Type alias for Results using LabError
pub type Result<T> = std::result::Result<T, LabError>;

impl From<serde_json::Error> for LabError {
    fn from(err: serde_json::Error) -> Self {
        LabError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for LabError {
    fn from(err: sqlx::Error) -> Self {
        LabError::Database(err.to_string())
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::migrate::MigrateError> for LabError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        LabError::Database(format!("migration failed: {err}"))
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for LabError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        use axum::Json;

        let (status, error_type) = match &self {
            LabError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            LabError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "invalid_input"),
            LabError::Serialization(_) => (StatusCode::BAD_REQUEST, "serialization_error"),
            LabError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            LabError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            LabError::Database(_) | LabError::Io(_) | LabError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
            LabError::ConfigLoad(_)
            | LabError::ProcessLaunch(_)
            | LabError::ProcessExit { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "process_error")
            }
            LabError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
        };

        let body = Json(serde_json::json!({
            "error": error_type,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl LabError {
    /// Returns the payload a caller should see for this error.
    ///
    /// For a failed process this is the captured output alone, without the
    /// "process exited" prefix; every other error uses its display string.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            LabError::ProcessExit { output, .. } => output.clone(),
            other => other.to_string(),
        }
    }

    /// Exit code carried by process errors.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            LabError::ProcessExit { code, .. } => Some(*code),
            LabError::ProcessLaunch(_) => Some(LAUNCH_FAILURE_CODE),
            _ => None,
        }
    }

    /// Determines if this error is a client error (4xx-equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LabError::NotFound { .. }
                | LabError::InvalidInput { .. }
                | LabError::Serialization(_)
                | LabError::Conflict(_)
        )
    }

    // ==========================================
    // Convenience constructors
    // ==========================================

    /// Creates a not found error
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        LabError::NotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// Creates an invalid input error
    #[must_use]
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        LabError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration error
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        LabError::Config(msg.into())
    }

    /// Creates a run configuration load error
    #[must_use]
    pub fn config_load(msg: impl Into<String>) -> Self {
        LabError::ConfigLoad(msg.into())
    }

    /// Creates a database error
    #[must_use]
    pub fn database(msg: impl Into<String>) -> Self {
        LabError::Database(msg.into())
    }

    /// Creates a conflict error
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        LabError::Conflict(msg.into())
    }

    /// Creates an internal error
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        LabError::Internal(msg.into())
    }
}
