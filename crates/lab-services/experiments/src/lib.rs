pub mod api;
pub mod bridge;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;

pub use api::{create_router, AppState};
pub use config::Config;
pub use db::{DbPool, InMemoryLabStore, LabStore, PgLabStore};
pub use error::{ExperimentErrorExt, LabError, Result};
pub use service::TrainingService;
