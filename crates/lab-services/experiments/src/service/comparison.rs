//! Side-by-side comparison of two experiments.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::LabStore;
use crate::error::{ExperimentErrorExt, LabError, Result};
use crate::models::{ExperimentDetail, ExperimentResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ParameterDifference {
    pub experiment_1: Option<String>,
    pub experiment_2: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetricComparison {
    pub experiment_1: Option<f64>,
    pub experiment_2: Option<f64>,
    /// `experiment_2 - experiment_1`, with a missing result counted as 0.
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExperimentComparison {
    pub experiment_1: ExperimentDetail,
    pub experiment_2: ExperimentDetail,
    pub parameter_differences: BTreeMap<String, ParameterDifference>,
    pub metric_comparison: BTreeMap<String, MetricComparison>,
}

/// Loads an experiment with its parameters and result row.
pub async fn experiment_detail(store: &dyn LabStore, experiment_id: i32) -> Result<ExperimentDetail> {
    let record = store
        .get_experiment(experiment_id)
        .await?
        .ok_or_else(|| LabError::experiment_not_found(experiment_id))?;
    let parameters = store.list_experiment_parameters(experiment_id).await?;
    let results = store.get_result(experiment_id).await?;

    Ok(ExperimentDetail {
        record,
        parameters,
        results,
    })
}

fn parameter_map(detail: &ExperimentDetail) -> BTreeMap<&str, Option<&str>> {
    detail
        .parameters
        .iter()
        .map(|p| (p.param_name.as_str(), p.param_value.as_deref()))
        .collect()
}

fn metric(result: Option<&ExperimentResult>, pick: fn(&ExperimentResult) -> f64) -> Option<f64> {
    result.map(pick)
}

pub fn compare(first: ExperimentDetail, second: ExperimentDetail) -> ExperimentComparison {
    let params_1 = parameter_map(&first);
    let params_2 = parameter_map(&second);

    let names: BTreeSet<&str> = params_1.keys().chain(params_2.keys()).copied().collect();
    let parameter_differences = names
        .into_iter()
        .filter_map(|name| {
            let value_1 = params_1.get(name).copied().flatten();
            let value_2 = params_2.get(name).copied().flatten();
            let present_1 = params_1.contains_key(name);
            let present_2 = params_2.contains_key(name);
            if present_1 == present_2 && value_1 == value_2 {
                return None;
            }
            Some((
                name.to_string(),
                ParameterDifference {
                    experiment_1: value_1.map(str::to_string),
                    experiment_2: value_2.map(str::to_string),
                },
            ))
        })
        .collect();

    let pickers: [(&str, fn(&ExperimentResult) -> f64); 4] = [
        ("accuracy", |r| r.accuracy),
        ("precision", |r| r.precision),
        ("recall", |r| r.recall),
        ("f1_score", |r| r.f1_score),
    ];
    let metric_comparison = pickers
        .into_iter()
        .map(|(name, pick)| {
            let value_1 = metric(first.results.as_ref(), pick);
            let value_2 = metric(second.results.as_ref(), pick);
            (
                name.to_string(),
                MetricComparison {
                    experiment_1: value_1,
                    experiment_2: value_2,
                    difference: value_2.unwrap_or(0.0) - value_1.unwrap_or(0.0),
                },
            )
        })
        .collect();

    ExperimentComparison {
        experiment_1: first,
        experiment_2: second,
        parameter_differences,
        metric_comparison,
    }
}
