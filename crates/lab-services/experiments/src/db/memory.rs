use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::store::LabStore;
use crate::error::{ExperimentErrorExt, LabError, Result};
use crate::models::{
    Dataset, Experiment, ExperimentParameter, ExperimentRecord, ExperimentResult,
    ExperimentStatus, ExperimentSummary, Model, ModelParameter, NewDataset, NewExperiment,
    ParameterValue, ResultUpdate,
};

#[derive(Debug, Default)]
struct State {
    datasets: BTreeMap<i32, Dataset>,
    models: BTreeMap<i32, Model>,
    model_parameters: BTreeMap<i32, ModelParameter>,
    experiments: BTreeMap<i32, Experiment>,
    experiment_parameters: Vec<ExperimentParameter>,
    results: BTreeMap<i32, ExperimentResult>,
    next_id: i32,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&self, experiment: &Experiment) -> ExperimentRecord {
        ExperimentRecord {
            experiment_id: experiment.experiment_id,
            model_id: experiment.model_id,
            dataset_id: experiment.dataset_id,
            notes: experiment.notes.clone(),
            status: experiment.status,
            start_time: experiment.start_time,
            end_time: experiment.end_time,
            model_name: experiment
                .model_id
                .and_then(|id| self.models.get(&id))
                .map(|m| m.model_name.clone()),
            dataset_name: experiment
                .dataset_id
                .and_then(|id| self.datasets.get(&id))
                .map(|d| d.filename.clone()),
        }
    }
}

/// Store kept entirely in memory, with the same observable behavior as the
/// Postgres store (joins, cascades, upsert semantics).
#[derive(Debug, Default)]
pub struct InMemoryLabStore {
    state: RwLock<State>,
    fail_writes: AtomicBool,
}

impl InMemoryLabStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every status and result write fail with a database error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LabError::database("store is rejecting writes"));
        }
        Ok(())
    }

    pub async fn add_model(&self, name: &str, model_type: Option<&str>) -> Model {
        let mut state = self.state.write().await;
        let model = Model {
            model_id: state.next_id(),
            model_name: name.to_string(),
            model_type: model_type.map(str::to_string),
            description: None,
        };
        state.models.insert(model.model_id, model.clone());
        model
    }

    pub async fn add_model_parameter(
        &self,
        model_id: i32,
        name: &str,
        value: Option<&str>,
    ) -> ModelParameter {
        let mut state = self.state.write().await;
        let param = ModelParameter {
            param_id: state.next_id(),
            model_id,
            param_name: name.to_string(),
            param_value: value.map(str::to_string),
            param_type: None,
            description: None,
        };
        state.model_parameters.insert(param.param_id, param.clone());
        param
    }

    /// Number of stored result rows for an experiment (0 or 1).
    pub async fn result_count(&self, experiment_id: i32) -> usize {
        let state = self.state.read().await;
        state
            .results
            .values()
            .filter(|r| r.experiment_id == experiment_id)
            .count()
    }
}

#[async_trait]
impl LabStore for InMemoryLabStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        let state = self.state.read().await;
        let mut datasets: Vec<Dataset> = state.datasets.values().cloned().collect();
        datasets.sort_by(|a, b| {
            b.upload_date
                .cmp(&a.upload_date)
                .then(b.dataset_id.cmp(&a.dataset_id))
        });
        Ok(datasets)
    }

    async fn create_dataset(&self, dataset: &NewDataset) -> Result<Dataset> {
        let mut state = self.state.write().await;
        let created = Dataset {
            dataset_id: state.next_id(),
            filename: dataset.filename.clone(),
            source: dataset.source.clone(),
            feature_count: dataset.feature_count,
            label_count: dataset.label_count,
            upload_date: Utc::now(),
        };
        state.datasets.insert(created.dataset_id, created.clone());
        Ok(created)
    }

    async fn delete_dataset(&self, dataset_id: i32) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.datasets.remove(&dataset_id).is_none() {
            return Ok(false);
        }
        for experiment in state.experiments.values_mut() {
            if experiment.dataset_id == Some(dataset_id) {
                experiment.dataset_id = None;
            }
        }
        Ok(true)
    }

    async fn list_models(&self) -> Result<Vec<Model>> {
        let state = self.state.read().await;
        Ok(state.models.values().cloned().collect())
    }

    async fn list_model_parameters(&self, model_id: i32) -> Result<Vec<ModelParameter>> {
        let state = self.state.read().await;
        Ok(state
            .model_parameters
            .values()
            .filter(|p| p.model_id == model_id)
            .cloned()
            .collect())
    }

    async fn update_model_parameters(
        &self,
        model_id: i32,
        updates: &[ParameterValue],
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for update in updates {
            for param in state.model_parameters.values_mut() {
                if param.model_id == model_id && param.param_name == update.param_name {
                    param.param_value = Some(update.param_value.clone());
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn list_experiments(&self) -> Result<Vec<ExperimentSummary>> {
        let state = self.state.read().await;
        let mut summaries: Vec<ExperimentSummary> = state
            .experiments
            .values()
            .map(|experiment| {
                let record = state.record(experiment);
                let result = state.results.get(&experiment.experiment_id);
                ExperimentSummary {
                    experiment_id: record.experiment_id,
                    model_id: record.model_id,
                    dataset_id: record.dataset_id,
                    notes: record.notes,
                    status: record.status,
                    start_time: record.start_time,
                    end_time: record.end_time,
                    model_name: record.model_name,
                    dataset_name: record.dataset_name,
                    accuracy: result.map(|r| r.accuracy),
                    precision: result.map(|r| r.precision),
                    recall: result.map(|r| r.recall),
                    f1_score: result.map(|r| r.f1_score),
                    runtime: result.and_then(|r| r.runtime.clone()),
                }
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then(b.experiment_id.cmp(&a.experiment_id))
        });
        Ok(summaries)
    }

    async fn get_experiment(&self, experiment_id: i32) -> Result<Option<ExperimentRecord>> {
        let state = self.state.read().await;
        Ok(state
            .experiments
            .get(&experiment_id)
            .map(|experiment| state.record(experiment)))
    }

    async fn list_experiment_parameters(
        &self,
        experiment_id: i32,
    ) -> Result<Vec<ExperimentParameter>> {
        let state = self.state.read().await;
        Ok(state
            .experiment_parameters
            .iter()
            .filter(|p| p.experiment_id == experiment_id)
            .cloned()
            .collect())
    }

    async fn create_experiment(&self, experiment: &NewExperiment) -> Result<Experiment> {
        let mut state = self.state.write().await;

        if let Some(id) = experiment.model_id {
            if !state.models.contains_key(&id) {
                return Err(LabError::invalid_input(
                    "model_id",
                    "model_id or dataset_id does not reference an existing row",
                ));
            }
        }
        if let Some(id) = experiment.dataset_id {
            if !state.datasets.contains_key(&id) {
                return Err(LabError::invalid_input(
                    "model_id",
                    "model_id or dataset_id does not reference an existing row",
                ));
            }
        }

        let created = Experiment {
            experiment_id: state.next_id(),
            model_id: experiment.model_id,
            dataset_id: experiment.dataset_id,
            notes: experiment.notes.clone(),
            status: ExperimentStatus::Running,
            start_time: Utc::now(),
            end_time: None,
        };
        state.experiments.insert(created.experiment_id, created.clone());

        for param in &experiment.parameters {
            state.experiment_parameters.push(ExperimentParameter {
                experiment_id: created.experiment_id,
                param_name: param.param_name.clone(),
                param_value: Some(param.param_value.clone()),
            });
        }

        Ok(created)
    }

    async fn delete_experiment(&self, experiment_id: i32) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.experiments.remove(&experiment_id).is_none() {
            return Ok(false);
        }
        state
            .experiment_parameters
            .retain(|p| p.experiment_id != experiment_id);
        state.results.remove(&experiment_id);
        Ok(true)
    }

    async fn mark_running(&self, experiment_id: i32) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        if let Some(experiment) = state.experiments.get_mut(&experiment_id) {
            experiment.status = ExperimentStatus::Running;
            experiment.start_time = Utc::now();
            experiment.end_time = None;
        }
        Ok(())
    }

    async fn mark_terminal(&self, experiment_id: i32, status: ExperimentStatus) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        if let Some(experiment) = state.experiments.get_mut(&experiment_id) {
            experiment.status = status;
            experiment.end_time = Some(Utc::now());
        }
        Ok(())
    }

    async fn upsert_result(
        &self,
        experiment_id: i32,
        update: &ResultUpdate,
    ) -> Result<ExperimentResult> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        if !state.experiments.contains_key(&experiment_id) {
            return Err(LabError::experiment_not_found(experiment_id));
        }

        if let Some(existing) = state.results.get_mut(&experiment_id) {
            update.apply_to(existing);
            return Ok(existing.clone());
        }

        let result = ExperimentResult {
            result_id: state.next_id(),
            experiment_id,
            accuracy: update.accuracy.unwrap_or(0.0),
            precision: update.precision.unwrap_or(0.0),
            recall: update.recall.unwrap_or(0.0),
            f1_score: update.f1_score.unwrap_or(0.0),
            runtime: update.runtime.clone(),
        };
        state.results.insert(experiment_id, result.clone());
        Ok(result)
    }

    async fn get_result(&self, experiment_id: i32) -> Result<Option<ExperimentResult>> {
        let state = self.state.read().await;
        Ok(state.results.get(&experiment_id).cloned())
    }
}
