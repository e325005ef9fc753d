//! Per-run configuration files handed to the training scripts.
//!
//! A run config is the project's base YAML document with the caller's
//! overrides merged into its `train` section. It lives only for the duration
//! of one invocation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value};
use tracing::debug;
use utoipa::ToSchema;

use super::metrics::leading_number;
use crate::error::{LabError, Result};

static LEADING_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[+-]?\d+").expect("valid integer pattern"));

/// Caller-supplied training overrides. Values arrive loosely typed (a
/// number or a string); unknown keys in the request are ignored.
///
/// A value is skipped only when it is `null` or an empty string. Numeric `0`
/// counts as present and is applied like `"0"`, so `random_seed: 0` seeds
/// the run with 0 rather than keeping the base config's seed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TrainingOverrides {
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub random_seed: Option<JsonValue>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub test_size: Option<JsonValue>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub rf_n_estimators: Option<JsonValue>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub rf_max_depth: Option<JsonValue>,
}

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Integer,
    Float,
    NullableInteger,
}

impl TrainingOverrides {
    fn fields(&self) -> [(&'static str, FieldKind, Option<&JsonValue>); 4] {
        [
            ("random_state", FieldKind::Integer, self.random_seed.as_ref()),
            ("test_size", FieldKind::Float, self.test_size.as_ref()),
            ("rf_n_estimators", FieldKind::Integer, self.rf_n_estimators.as_ref()),
            ("rf_max_depth", FieldKind::NullableInteger, self.rf_max_depth.as_ref()),
        ]
    }

    /// The `train.*` assignments these overrides produce, after coercion.
    /// Missing, empty, and uncoercible values produce nothing.
    pub fn assignments(&self) -> Vec<(&'static str, Value)> {
        self.fields()
            .into_iter()
            .filter_map(|(field, kind, raw)| {
                let raw = raw.filter(|v| is_present(v))?;
                coerce(kind, raw).map(|value| (field, value))
            })
            .collect()
    }
}

fn is_present(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn coerce(kind: FieldKind, raw: &JsonValue) -> Option<Value> {
    match kind {
        FieldKind::Integer => integer_value(raw).map(|v| Value::Number(v.into())),
        FieldKind::Float => float_value(raw).map(|v| Value::Number(v.into())),
        FieldKind::NullableInteger => match raw {
            JsonValue::String(s) if s == "null" => Some(Value::Null),
            other => integer_value(other).map(|v| Value::Number(v.into())),
        },
    }
}

fn integer_value(raw: &JsonValue) -> Option<i64> {
    match raw {
        JsonValue::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        JsonValue::String(s) => LEADING_INTEGER
            .find(s)
            .and_then(|m| m.as_str().trim().parse::<i64>().ok()),
        _ => None,
    }
}

fn float_value(raw: &JsonValue) -> Option<f64> {
    match raw {
        JsonValue::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        JsonValue::String(s) => leading_number(s),
        _ => None,
    }
}

/// Merges the overrides into `document` in place.
///
/// # Errors
///
/// `LabError::ConfigLoad` if the document or its `train` section is not a
/// mapping.
pub fn apply_overrides(document: &mut Value, overrides: &TrainingOverrides) -> Result<()> {
    let assignments = overrides.assignments();
    if assignments.is_empty() {
        return Ok(());
    }

    if document.is_null() {
        *document = Value::Mapping(Mapping::new());
    }
    let root = document
        .as_mapping_mut()
        .ok_or_else(|| LabError::config_load("base config is not a mapping"))?;

    if !root.contains_key("train") {
        root.insert(Value::String("train".to_string()), Value::Mapping(Mapping::new()));
    }
    let train = root
        .get_mut("train")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| LabError::config_load("`train` section is not a mapping"))?;

    for (field, value) in assignments {
        train.insert(Value::String(field.to_string()), value);
    }

    Ok(())
}

/// Identifies the invocation a run config belongs to.
#[derive(Debug, Clone, Copy)]
pub enum RunTag {
    Experiment(i32),
    Timestamp(i64),
}

impl RunTag {
    pub fn for_experiment(experiment_id: Option<i32>) -> Self {
        match experiment_id {
            Some(id) => RunTag::Experiment(id),
            None => RunTag::Timestamp(chrono::Utc::now().timestamp_millis()),
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            RunTag::Experiment(id) => format!("experiment_{id}.yaml"),
            RunTag::Timestamp(millis) => format!("experiment_{millis}.yaml"),
        }
    }
}

/// Handle to a materialized run config on disk.
#[derive(Debug)]
pub struct RunConfig {
    path: PathBuf,
}

impl RunConfig {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file. Failure is logged and otherwise ignored.
    pub async fn remove(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            debug!(path = %self.path.display(), error = %e, "Could not remove run config");
        }
    }
}

/// Loads `base_config`, merges `overrides`, and writes the result into
/// `output_dir` under a name derived from `tag`.
///
/// # Errors
///
/// `LabError::ConfigLoad` if the base document cannot be read or parsed;
/// `LabError::Io` if the run config cannot be written.
pub async fn materialize(
    base_config: &Path,
    overrides: &TrainingOverrides,
    output_dir: &Path,
    tag: RunTag,
) -> Result<RunConfig> {
    let raw = tokio::fs::read_to_string(base_config)
        .await
        .map_err(|e| LabError::config_load(format!("{}: {e}", base_config.display())))?;

    let mut document: Value = serde_yaml::from_str(&raw)
        .map_err(|e| LabError::config_load(format!("{}: {e}", base_config.display())))?;

    apply_overrides(&mut document, overrides)?;

    let rendered = serde_yaml::to_string(&document)
        .map_err(|e| LabError::Serialization(e.to_string()))?;

    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(tag.file_name());
    tokio::fs::write(&path, rendered).await?;

    debug!(path = %path.display(), "Materialized run config");
    Ok(RunConfig { path })
}
