//! Train and evaluate orchestration.
//!
//! A training run moves its experiment to `running`, materializes a run
//! config from the base config plus overrides, runs the training script,
//! parses the classification report, and records a terminal status with the
//! metrics. Any failure after the experiment was marked running records
//! `failed` before the error is returned, so no invocation leaves its
//! experiment running.
//!
//! Runs execute on their own task. Dropping the caller's future (a client
//! disconnecting mid-request) detaches the run instead of killing it, so it
//! still reaches a terminal status.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::recorder::ExperimentRecorder;
use super::run_guard::{RunGuard, RunPermit};
use crate::bridge::{
    materialize, parse_classification_report, parse_labelled_metrics, EvaluationMetrics,
    ProcessInvoker, RunConfig, RunTag, TrainingMetrics, TrainingOverrides,
};
use crate::config::BridgeConfig;
use crate::db::LabStore;
use crate::error::{LabError, Result};
use crate::models::{ExperimentStatus, ResultUpdate};

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TrainRequest {
    #[serde(default)]
    pub experiment_id: Option<i32>,
    #[serde(default)]
    pub parameters: Option<TrainingOverrides>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrainOutcome {
    pub output: String,
    pub model_path: String,
    pub metrics: TrainingMetrics,
    /// Wall time of the training process, e.g. `"12.34s"`.
    pub runtime: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub experiment_id: Option<i32>,
    /// Run config passed to the evaluation script, relative to the project root.
    #[serde(default)]
    pub config_path: Option<String>,
    #[serde(default)]
    pub model_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EvaluateOutcome {
    pub output: String,
    pub metrics: EvaluationMetrics,
}

#[derive(Clone)]
pub struct TrainingService {
    config: Arc<BridgeConfig>,
    invoker: Arc<ProcessInvoker>,
    recorder: ExperimentRecorder,
    store: Arc<dyn LabStore>,
    guard: Option<RunGuard>,
}

impl TrainingService {
    pub fn new(config: BridgeConfig, store: Arc<dyn LabStore>) -> Self {
        let invoker = ProcessInvoker::from_config(&config);
        let guard = config.exclusive_runs.then(RunGuard::new);

        Self {
            config: Arc::new(config),
            invoker: Arc::new(invoker),
            recorder: ExperimentRecorder::new(Arc::clone(&store)),
            store,
            guard,
        }
    }

    pub fn run_guard(&self) -> Option<&RunGuard> {
        self.guard.as_ref()
    }

    fn acquire(&self, experiment_id: Option<i32>) -> Result<Option<RunPermit>> {
        match (&self.guard, experiment_id) {
            (Some(guard), Some(id)) => guard.try_acquire(id).map(Some),
            _ => Ok(None),
        }
    }

    /// Runs the training script for one experiment (or anonymously).
    ///
    /// # Errors
    ///
    /// `Conflict` when exclusive runs are enabled and the experiment already
    /// has a run in flight (the experiment is not touched). Otherwise the
    /// first error among the status write, config materialization, process
    /// run and result write, after the experiment was marked `failed`.
    pub async fn train(&self, request: TrainRequest) -> Result<TrainOutcome> {
        let service = self.clone();
        join_run(tokio::spawn(async move { service.train_detached(request).await })).await
    }

    async fn train_detached(&self, request: TrainRequest) -> Result<TrainOutcome> {
        let experiment_id = request.experiment_id;
        let _permit = self.acquire(experiment_id)?;

        let overrides = request.parameters.unwrap_or_default();
        let mut run_config = None;

        let result = self
            .run_training(experiment_id, &overrides, &mut run_config)
            .await;

        match result {
            Ok(outcome) => {
                if let Some(config) = run_config {
                    config.remove().await;
                }
                Ok(outcome)
            }
            Err(err) => {
                error!(experiment_id = ?experiment_id, error = %err, "Training failed");

                if let Err(record_err) = self
                    .recorder
                    .mark_terminal(experiment_id, ExperimentStatus::Failed, None)
                    .await
                {
                    error!(
                        experiment_id = ?experiment_id,
                        error = %record_err,
                        "Failed to record training failure"
                    );
                }

                if let Some(config) = run_config {
                    if self.config.keep_config_on_failure {
                        info!(path = %config.path().display(), "Keeping run config of failed run");
                    } else {
                        config.remove().await;
                    }
                }

                Err(err)
            }
        }
    }

    async fn run_training(
        &self,
        experiment_id: Option<i32>,
        overrides: &TrainingOverrides,
        run_config: &mut Option<RunConfig>,
    ) -> Result<TrainOutcome> {
        self.recorder.mark_running(experiment_id).await?;

        let config = run_config.insert(
            materialize(
                &self.config.base_config_path(),
                overrides,
                &self.config.run_config_dir(),
                RunTag::for_experiment(experiment_id),
            )
            .await?,
        );
        let config_path = absolute(config.path())?;
        info!(experiment_id = ?experiment_id, path = %config_path, "Using run config");

        let output = self
            .invoker
            .run(
                &self.config.train_script,
                &["--config".to_string(), config_path],
            )
            .await?;

        let metrics = parse_classification_report(&output.stdout);
        let seconds = format!("{:.2}", output.duration.as_secs_f64());

        let update = ResultUpdate::from_training(&metrics, format!("{seconds} seconds"));
        self.recorder
            .mark_terminal(experiment_id, ExperimentStatus::Completed, Some(&update))
            .await?;

        info!(
            experiment_id = ?experiment_id,
            accuracy = metrics.accuracy,
            f1_score = metrics.f1_score,
            runtime = %seconds,
            "Training completed"
        );

        Ok(TrainOutcome {
            output: output.stdout,
            model_path: self.config.model_path.clone(),
            metrics,
            runtime: format!("{seconds}s"),
        })
    }

    /// Runs the evaluation script and, for a known experiment, stores the
    /// metrics it printed. The experiment status is not changed.
    pub async fn evaluate(&self, request: EvaluateRequest) -> Result<EvaluateOutcome> {
        let service = self.clone();
        join_run(tokio::spawn(async move { service.evaluate_detached(request).await })).await
    }

    async fn evaluate_detached(&self, request: EvaluateRequest) -> Result<EvaluateOutcome> {
        let config_path = request
            .config_path
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.config.base_config.display().to_string());
        let model_path = request
            .model_path
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.config.model_path.clone());

        let output = self
            .invoker
            .run(
                &self.config.evaluate_script,
                &[
                    "--config".to_string(),
                    config_path,
                    "--model".to_string(),
                    model_path,
                ],
            )
            .await?;

        let metrics = parse_labelled_metrics(&output.stdout);

        match request.experiment_id {
            Some(id) if !metrics.is_empty() => {
                self.store
                    .upsert_result(id, &ResultUpdate::from_evaluation(&metrics))
                    .await?;
            }
            Some(id) => {
                warn!(experiment_id = id, "No metrics found in evaluation output");
            }
            None => {}
        }

        Ok(EvaluateOutcome {
            output: output.stdout,
            metrics,
        })
    }
}

async fn join_run<T>(handle: tokio::task::JoinHandle<Result<T>>) -> Result<T> {
    handle
        .await
        .map_err(|e| LabError::internal(format!("run task aborted: {e}")))?
}

fn absolute(path: &Path) -> Result<String> {
    Ok(std::path::absolute(path)?.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryLabStore;
    use crate::models::NewExperiment;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    const BASE: &str = "train:\n  test_size: 0.2\n  random_state: 42\n  rf_n_estimators: 300\n  rf_max_depth: 12\n";

    const REPORT_SCRIPT: &str = r#"
cat "$2"
echo "              precision    recall  f1-score   support"
echo "accuracy                           0.9500      500"
echo "   macro avg     0.9300    0.9100    0.9200       500"
"#;

    struct Fixture {
        dir: TempDir,
        store: Arc<InMemoryLabStore>,
    }

    impl Fixture {
        fn new(train_script: &str) -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("configs")).unwrap();
            std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
            std::fs::write(dir.path().join("configs/base.yaml"), BASE).unwrap();
            std::fs::write(dir.path().join("scripts/train.py"), train_script).unwrap();
            Self {
                dir,
                store: Arc::new(InMemoryLabStore::new()),
            }
        }

        fn with_evaluate(self, script: &str) -> Self {
            std::fs::write(self.dir.path().join("scripts/evaluate.py"), script).unwrap();
            self
        }

        fn bridge_config(&self) -> BridgeConfig {
            BridgeConfig {
                interpreter: "sh".to_string(),
                project_root: self.dir.path().to_path_buf(),
                ..Default::default()
            }
        }

        fn service(&self) -> TrainingService {
            self.service_with(self.bridge_config())
        }

        fn service_with(&self, config: BridgeConfig) -> TrainingService {
            TrainingService::new(config, self.store.clone())
        }

        fn run_config_path(&self, id: i32) -> PathBuf {
            self.dir
                .path()
                .join("configs")
                .join(format!("experiment_{id}.yaml"))
        }

        async fn experiment(&self) -> i32 {
            self.store
                .create_experiment(&NewExperiment {
                    model_id: None,
                    dataset_id: None,
                    notes: None,
                    parameters: vec![],
                })
                .await
                .unwrap()
                .experiment_id
        }

        async fn status(&self, id: i32) -> ExperimentStatus {
            self.store
                .get_experiment(id)
                .await
                .unwrap()
                .unwrap()
                .status
        }

        async fn wait_until_settled(&self, id: i32) -> ExperimentStatus {
            for _ in 0..100 {
                let status = self.status(id).await;
                if status != ExperimentStatus::Running {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.status(id).await
        }

        fn leftover_run_configs(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("configs"))
                .unwrap()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with("experiment_"))
                .count()
        }
    }

    #[tokio::test]
    async fn test_train_success_records_completed_result() {
        let fx = Fixture::new(REPORT_SCRIPT);
        let id = fx.experiment().await;

        let outcome = fx
            .service()
            .train(TrainRequest {
                experiment_id: Some(id),
                parameters: Some(serde_json::from_value(json!({ "random_seed": "7" })).unwrap()),
            })
            .await
            .unwrap();

        assert_eq!(outcome.metrics.accuracy, 0.95);
        assert_eq!(outcome.metrics.precision, 0.93);
        assert_eq!(outcome.metrics.recall, 0.91);
        assert_eq!(outcome.metrics.f1_score, 0.92);
        assert_eq!(outcome.model_path, "artifacts/model.joblib");
        assert!(outcome.runtime.ends_with('s'));
        assert!(!outcome.runtime.ends_with(" seconds"));
        assert!(outcome.output.contains("random_state: 7"));

        assert_eq!(fx.status(id).await, ExperimentStatus::Completed);
        assert_eq!(fx.store.result_count(id).await, 1);
        let result = fx.store.get_result(id).await.unwrap().unwrap();
        assert_eq!(result.f1_score, 0.92);
        assert!(result.runtime.unwrap().ends_with(" seconds"));

        assert!(!fx.run_config_path(id).exists());
    }

    #[tokio::test]
    async fn test_train_failure_marks_failed_and_keeps_config() {
        let fx = Fixture::new("echo 'Traceback: boom' >&2\nexit 1\n");
        let id = fx.experiment().await;

        let err = fx
            .service()
            .train(TrainRequest {
                experiment_id: Some(id),
                parameters: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.detail(), "Traceback: boom\n");
        assert_eq!(fx.status(id).await, ExperimentStatus::Failed);
        assert_eq!(fx.store.result_count(id).await, 0);
        assert!(fx.run_config_path(id).exists());
    }

    #[tokio::test]
    async fn test_train_failure_removes_config_when_configured() {
        let fx = Fixture::new("exit 2\n");
        let id = fx.experiment().await;
        let service = fx.service_with(BridgeConfig {
            keep_config_on_failure: false,
            ..fx.bridge_config()
        });

        let err = service
            .train(TrainRequest {
                experiment_id: Some(id),
                parameters: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), Some(2));
        assert!(!fx.run_config_path(id).exists());
    }

    #[tokio::test]
    async fn test_train_launch_failure_marks_failed() {
        let fx = Fixture::new(REPORT_SCRIPT);
        let id = fx.experiment().await;
        let service = fx.service_with(BridgeConfig {
            interpreter: "/nonexistent/python".to_string(),
            ..fx.bridge_config()
        });

        let err = service
            .train(TrainRequest {
                experiment_id: Some(id),
                parameters: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LabError::ProcessLaunch(_)));
        let record = fx.store.get_experiment(id).await.unwrap().unwrap();
        assert_eq!(record.status, ExperimentStatus::Failed);
        assert!(record.end_time.is_some());
        assert_eq!(fx.store.result_count(id).await, 0);
    }

    #[tokio::test]
    async fn test_dropped_caller_still_completes_run() {
        let fx = Fixture::new(&format!("sleep 1\n{REPORT_SCRIPT}"));
        let id = fx.experiment().await;
        fx.store
            .mark_terminal(id, ExperimentStatus::Completed)
            .await
            .unwrap();
        let service = fx.service();

        let request = TrainRequest {
            experiment_id: Some(id),
            parameters: None,
        };
        let abandoned =
            tokio::time::timeout(Duration::from_millis(200), service.train(request)).await;
        assert!(abandoned.is_err());
        assert_eq!(fx.status(id).await, ExperimentStatus::Running);

        assert_eq!(fx.wait_until_settled(id).await, ExperimentStatus::Completed);
        assert_eq!(fx.store.result_count(id).await, 1);

        let config = fx.run_config_path(id);
        for _ in 0..40 {
            if !config.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!config.exists());
    }

    #[tokio::test]
    async fn test_train_missing_base_config_marks_failed() {
        let fx = Fixture::new(REPORT_SCRIPT);
        std::fs::remove_file(fx.dir.path().join("configs/base.yaml")).unwrap();
        let id = fx.experiment().await;

        let err = fx
            .service()
            .train(TrainRequest {
                experiment_id: Some(id),
                parameters: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LabError::ConfigLoad(_)));
        assert_eq!(fx.status(id).await, ExperimentStatus::Failed);
        assert_eq!(fx.store.result_count(id).await, 0);
    }

    #[tokio::test]
    async fn test_anonymous_train_touches_no_experiment() {
        let fx = Fixture::new(REPORT_SCRIPT);
        let id = fx.experiment().await;
        fx.store
            .mark_terminal(id, ExperimentStatus::Completed)
            .await
            .unwrap();

        let outcome = fx.service().train(TrainRequest::default()).await.unwrap();

        assert_eq!(outcome.metrics.accuracy, 0.95);
        assert_eq!(fx.status(id).await, ExperimentStatus::Completed);
        assert_eq!(fx.store.result_count(id).await, 0);
        assert_eq!(fx.leftover_run_configs(), 0);
    }

    #[tokio::test]
    async fn test_train_without_report_records_zero_metrics() {
        let fx = Fixture::new("echo 'trained'\n");
        let id = fx.experiment().await;

        let outcome = fx
            .service()
            .train(TrainRequest {
                experiment_id: Some(id),
                parameters: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.metrics, TrainingMetrics::default());
        assert_eq!(fx.status(id).await, ExperimentStatus::Completed);
        let result = fx.store.get_result(id).await.unwrap().unwrap();
        assert_eq!(result.accuracy, 0.0);
    }

    #[tokio::test]
    async fn test_exclusive_runs_reject_concurrent_run() {
        let fx = Fixture::new(REPORT_SCRIPT);
        let id = fx.experiment().await;
        fx.store
            .mark_terminal(id, ExperimentStatus::Completed)
            .await
            .unwrap();
        let service = fx.service_with(BridgeConfig {
            exclusive_runs: true,
            ..fx.bridge_config()
        });

        let guard = service.run_guard().unwrap().clone();
        let permit = guard.try_acquire(id).unwrap();

        let err = service
            .train(TrainRequest {
                experiment_id: Some(id),
                parameters: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LabError::Conflict(_)));
        assert_eq!(fx.status(id).await, ExperimentStatus::Completed);
        assert!(!fx.run_config_path(id).exists());

        drop(permit);
        service
            .train(TrainRequest {
                experiment_id: Some(id),
                parameters: None,
            })
            .await
            .unwrap();
        assert!(!guard.is_active(id));
    }

    #[tokio::test]
    async fn test_evaluate_stores_parsed_metrics_without_status_change() {
        let fx = Fixture::new(REPORT_SCRIPT).with_evaluate(
            "echo \"config=$2 model=$4\"\necho 'Accuracy: 0.97'\necho 'Recall: 0.93'\n",
        );
        let id = fx.experiment().await;

        let outcome = fx
            .service()
            .evaluate(EvaluateRequest {
                experiment_id: Some(id),
                config_path: None,
                model_path: None,
            })
            .await
            .unwrap();

        assert!(outcome
            .output
            .contains("config=configs/base.yaml model=artifacts/model.joblib"));
        assert_eq!(outcome.metrics.accuracy, Some(0.97));
        assert_eq!(outcome.metrics.recall, Some(0.93));
        assert_eq!(outcome.metrics.precision, None);

        let result = fx.store.get_result(id).await.unwrap().unwrap();
        assert_eq!(result.accuracy, 0.97);
        assert_eq!(result.precision, 0.0);
        assert_eq!(fx.status(id).await, ExperimentStatus::Running);
    }

    #[tokio::test]
    async fn test_evaluate_without_metrics_writes_nothing() {
        let fx = Fixture::new(REPORT_SCRIPT).with_evaluate("echo 'done'\n");
        let id = fx.experiment().await;

        let outcome = fx
            .service()
            .evaluate(EvaluateRequest {
                experiment_id: Some(id),
                config_path: Some("configs/custom.yaml".to_string()),
                model_path: Some("artifacts/other.joblib".to_string()),
            })
            .await
            .unwrap();

        assert!(outcome.metrics.is_empty());
        assert_eq!(fx.store.result_count(id).await, 0);
    }

    #[tokio::test]
    async fn test_evaluate_failure_propagates() {
        let fx = Fixture::new(REPORT_SCRIPT).with_evaluate("echo 'no model' >&2\nexit 1\n");

        let err = fx
            .service()
            .evaluate(EvaluateRequest::default())
            .await
            .unwrap_err();

        assert_eq!(err.detail(), "no model\n");
    }
}
