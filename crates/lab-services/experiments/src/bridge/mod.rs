//! Bridge between the HTTP service and the external training project.
//!
//! - [`run_config`]: materializes per-run YAML configs from the base config
//! - [`process`]: launches the interpreter and captures console output
//! - [`metrics`]: recovers metrics from that output

pub mod metrics;
pub mod process;
pub mod run_config;

pub use metrics::{
    parse_classification_report, parse_labelled_metrics, EvaluationMetrics, TrainingMetrics,
};
pub use process::{ProcessInvoker, ProcessOutput};
pub use run_config::{materialize, RunConfig, RunTag, TrainingOverrides};
