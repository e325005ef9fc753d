use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Dataset, Experiment, ExperimentParameter, ExperimentRecord, ExperimentResult,
    ExperimentStatus, ExperimentSummary, Model, ModelParameter, NewDataset, NewExperiment,
    ParameterValue, ResultUpdate,
};

/// Persistence used by the HTTP handlers and the training bridge.
///
/// Handlers and services hold an `Arc<dyn LabStore>`, so tests can swap the
/// Postgres store for [`crate::db::InMemoryLabStore`].
#[async_trait]
pub trait LabStore: Send + Sync {
    /// Round trip to the backing store.
    async fn ping(&self) -> Result<()>;

    /// All datasets, newest upload first.
    async fn list_datasets(&self) -> Result<Vec<Dataset>>;

    async fn create_dataset(&self, dataset: &NewDataset) -> Result<Dataset>;

    /// Returns `false` if no dataset had this id.
    async fn delete_dataset(&self, dataset_id: i32) -> Result<bool>;

    async fn list_models(&self) -> Result<Vec<Model>>;

    async fn list_model_parameters(&self, model_id: i32) -> Result<Vec<ModelParameter>>;

    /// Updates existing parameters by name. Unknown names are skipped.
    /// Returns the number of parameters changed.
    async fn update_model_parameters(
        &self,
        model_id: i32,
        updates: &[ParameterValue],
    ) -> Result<u64>;

    /// Experiments joined with model name, dataset filename and result
    /// metrics, most recently started first.
    async fn list_experiments(&self) -> Result<Vec<ExperimentSummary>>;

    async fn get_experiment(&self, experiment_id: i32) -> Result<Option<ExperimentRecord>>;

    async fn list_experiment_parameters(
        &self,
        experiment_id: i32,
    ) -> Result<Vec<ExperimentParameter>>;

    /// Inserts the experiment with status `running` and stores its
    /// parameters.
    async fn create_experiment(&self, experiment: &NewExperiment) -> Result<Experiment>;

    /// Deletes the experiment together with its parameters and result.
    async fn delete_experiment(&self, experiment_id: i32) -> Result<bool>;

    /// Sets status `running` and restarts `start_time`. Unknown ids are a
    /// no-op.
    async fn mark_running(&self, experiment_id: i32) -> Result<()>;

    /// Sets a terminal status and stamps `end_time`. Unknown ids are a
    /// no-op.
    async fn mark_terminal(&self, experiment_id: i32, status: ExperimentStatus) -> Result<()>;

    /// Inserts or updates the single result row of an experiment.
    async fn upsert_result(
        &self,
        experiment_id: i32,
        update: &ResultUpdate,
    ) -> Result<ExperimentResult>;

    async fn get_result(&self, experiment_id: i32) -> Result<Option<ExperimentResult>>;
}
