use async_trait::async_trait;
use sqlx::PgPool;

use super::store::LabStore;
use crate::error::{ExperimentErrorExt, LabError, Result};
use crate::models::{
    Dataset, Experiment, ExperimentParameter, ExperimentRecord, ExperimentResult,
    ExperimentStatus, ExperimentSummary, Model, ModelParameter, NewDataset, NewExperiment,
    ParameterValue, ResultUpdate,
};

const EXPERIMENT_COLUMNS: &str =
    "experiment_id, model_id, dataset_id, notes, status, start_time, end_time";

const RESULT_COLUMNS: &str =
    r#"result_id, experiment_id, accuracy, "precision", recall, f1_score, runtime"#;

#[derive(Debug, Clone)]
pub struct PgLabStore {
    pool: PgPool,
}

impl PgLabStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

#[async_trait]
impl LabStore for PgLabStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        let datasets = sqlx::query_as::<_, Dataset>(
            r#"
            SELECT dataset_id, filename, source, feature_count, label_count, upload_date
            FROM datasets
            ORDER BY upload_date DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(datasets)
    }

    async fn create_dataset(&self, dataset: &NewDataset) -> Result<Dataset> {
        let created = sqlx::query_as::<_, Dataset>(
            r#"
            INSERT INTO datasets (filename, source, feature_count, label_count)
            VALUES ($1, $2, $3, $4)
            RETURNING dataset_id, filename, source, feature_count, label_count, upload_date
            "#,
        )
        .bind(&dataset.filename)
        .bind(&dataset.source)
        .bind(dataset.feature_count)
        .bind(dataset.label_count)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn delete_dataset(&self, dataset_id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM datasets WHERE dataset_id = $1")
            .bind(dataset_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_models(&self) -> Result<Vec<Model>> {
        let models = sqlx::query_as::<_, Model>(
            "SELECT model_id, model_name, model_type, description FROM models ORDER BY model_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(models)
    }

    async fn list_model_parameters(&self, model_id: i32) -> Result<Vec<ModelParameter>> {
        let params = sqlx::query_as::<_, ModelParameter>(
            r#"
            SELECT param_id, model_id, param_name, param_value, param_type, description
            FROM model_parameters
            WHERE model_id = $1
            ORDER BY param_id
            "#,
        )
        .bind(model_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(params)
    }

    async fn update_model_parameters(
        &self,
        model_id: i32,
        updates: &[ParameterValue],
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for update in updates {
            let result = sqlx::query(
                r#"
                UPDATE model_parameters
                SET param_value = $1
                WHERE model_id = $2 AND param_name = $3
                "#,
            )
            .bind(&update.param_value)
            .bind(model_id)
            .bind(&update.param_name)
            .execute(&mut *tx)
            .await?;

            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn list_experiments(&self) -> Result<Vec<ExperimentSummary>> {
        let experiments = sqlx::query_as::<_, ExperimentSummary>(
            r#"
            SELECT e.experiment_id, e.model_id, e.dataset_id, e.notes, e.status,
                   e.start_time, e.end_time,
                   m.model_name, d.filename AS dataset_name,
                   er.accuracy, er."precision", er.recall, er.f1_score, er.runtime
            FROM experiments e
            LEFT JOIN models m ON e.model_id = m.model_id
            LEFT JOIN datasets d ON e.dataset_id = d.dataset_id
            LEFT JOIN experiment_results er ON e.experiment_id = er.experiment_id
            ORDER BY e.start_time DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(experiments)
    }

    async fn get_experiment(&self, experiment_id: i32) -> Result<Option<ExperimentRecord>> {
        let record = sqlx::query_as::<_, ExperimentRecord>(
            r#"
            SELECT e.experiment_id, e.model_id, e.dataset_id, e.notes, e.status,
                   e.start_time, e.end_time,
                   m.model_name, d.filename AS dataset_name
            FROM experiments e
            LEFT JOIN models m ON e.model_id = m.model_id
            LEFT JOIN datasets d ON e.dataset_id = d.dataset_id
            WHERE e.experiment_id = $1
            "#,
        )
        .bind(experiment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_experiment_parameters(
        &self,
        experiment_id: i32,
    ) -> Result<Vec<ExperimentParameter>> {
        let params = sqlx::query_as::<_, ExperimentParameter>(
            r#"
            SELECT experiment_id, param_name, param_value
            FROM experiment_parameters
            WHERE experiment_id = $1
            ORDER BY param_id
            "#,
        )
        .bind(experiment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(params)
    }

    async fn create_experiment(&self, experiment: &NewExperiment) -> Result<Experiment> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Experiment>(&format!(
            r#"
            INSERT INTO experiments (model_id, dataset_id, notes, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {EXPERIMENT_COLUMNS}
            "#
        ))
        .bind(experiment.model_id)
        .bind(experiment.dataset_id)
        .bind(&experiment.notes)
        .bind(ExperimentStatus::Running)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                return LabError::invalid_input(
                    "model_id",
                    "model_id or dataset_id does not reference an existing row",
                );
            }
            LabError::from(e)
        })?;

        for param in &experiment.parameters {
            sqlx::query(
                r#"
                INSERT INTO experiment_parameters (experiment_id, param_name, param_value)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(created.experiment_id)
            .bind(&param.param_name)
            .bind(&param.param_value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn delete_experiment(&self, experiment_id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM experiments WHERE experiment_id = $1")
            .bind(experiment_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_running(&self, experiment_id: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE experiments
            SET status = $1, start_time = NOW(), end_time = NULL
            WHERE experiment_id = $2
            "#,
        )
        .bind(ExperimentStatus::Running)
        .bind(experiment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_terminal(&self, experiment_id: i32, status: ExperimentStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE experiments
            SET status = $1, end_time = NOW()
            WHERE experiment_id = $2
            "#,
        )
        .bind(status)
        .bind(experiment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_result(
        &self,
        experiment_id: i32,
        update: &ResultUpdate,
    ) -> Result<ExperimentResult> {
        let result = sqlx::query_as::<_, ExperimentResult>(&format!(
            r#"
            INSERT INTO experiment_results
                (experiment_id, accuracy, "precision", recall, f1_score, runtime)
            VALUES ($1, COALESCE($2, 0), COALESCE($3, 0), COALESCE($4, 0), COALESCE($5, 0), $6)
            ON CONFLICT (experiment_id) DO UPDATE SET
                accuracy = COALESCE($2, experiment_results.accuracy),
                "precision" = COALESCE($3, experiment_results."precision"),
                recall = COALESCE($4, experiment_results.recall),
                f1_score = COALESCE($5, experiment_results.f1_score),
                runtime = COALESCE($6, experiment_results.runtime)
            RETURNING {RESULT_COLUMNS}
            "#
        ))
        .bind(experiment_id)
        .bind(update.accuracy)
        .bind(update.precision)
        .bind(update.recall)
        .bind(update.f1_score)
        .bind(&update.runtime)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                return LabError::experiment_not_found(experiment_id);
            }
            LabError::from(e)
        })?;

        Ok(result)
    }

    async fn get_result(&self, experiment_id: i32) -> Result<Option<ExperimentResult>> {
        let result = sqlx::query_as::<_, ExperimentResult>(&format!(
            "SELECT {RESULT_COLUMNS} FROM experiment_results WHERE experiment_id = $1"
        ))
        .bind(experiment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }
}
