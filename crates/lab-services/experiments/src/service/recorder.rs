use std::sync::Arc;

use tracing::debug;

use crate::db::LabStore;
use crate::error::Result;
use crate::models::{ExperimentStatus, ResultUpdate};

/// Records experiment lifecycle transitions around a bridged run.
///
/// Both operations are no-ops without an experiment id, so anonymous runs
/// never touch the store.
#[derive(Clone)]
pub struct ExperimentRecorder {
    store: Arc<dyn LabStore>,
}

impl ExperimentRecorder {
    pub fn new(store: Arc<dyn LabStore>) -> Self {
        Self { store }
    }

    pub async fn mark_running(&self, experiment_id: Option<i32>) -> Result<()> {
        let Some(id) = experiment_id else {
            return Ok(());
        };

        debug!(experiment_id = id, "Marking experiment running");
        self.store.mark_running(id).await
    }

    /// Sets a terminal status and, when `metrics` is given, upserts the
    /// result row. Repeating the call leaves a single result row.
    pub async fn mark_terminal(
        &self,
        experiment_id: Option<i32>,
        status: ExperimentStatus,
        metrics: Option<&ResultUpdate>,
    ) -> Result<()> {
        let Some(id) = experiment_id else {
            return Ok(());
        };

        debug!(experiment_id = id, %status, "Marking experiment terminal");
        self.store.mark_terminal(id, status).await?;

        if let Some(update) = metrics {
            self.store.upsert_result(id, update).await?;
        }

        Ok(())
    }
}
