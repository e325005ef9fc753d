//! Per-experiment mutual exclusion for bridged runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ExperimentErrorExt, LabError, Result};

/// Tracks experiment ids with a run in flight.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    active: Arc<Mutex<HashSet<i32>>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<i32>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims `experiment_id` until the returned permit is dropped.
    ///
    /// # Errors
    ///
    /// `LabError::Conflict` if another run holds the id.
    pub fn try_acquire(&self, experiment_id: i32) -> Result<RunPermit> {
        if !self.lock().insert(experiment_id) {
            return Err(LabError::run_in_progress(experiment_id));
        }

        Ok(RunPermit {
            experiment_id,
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, experiment_id: i32) -> bool {
        self.lock().contains(&experiment_id)
    }
}

/// Releases its experiment id on drop.
#[derive(Debug)]
pub struct RunPermit {
    experiment_id: i32,
    active: Arc<Mutex<HashSet<i32>>>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.experiment_id);
    }
}
