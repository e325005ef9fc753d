pub mod catalog;
pub mod experiment;

pub use catalog::{Dataset, Model, ModelParameter, NewDataset, ParameterValue};
pub use experiment::{
    Experiment, ExperimentDetail, ExperimentParameter, ExperimentRecord, ExperimentResult,
    ExperimentStatus, ExperimentSummary, NewExperiment, ResultUpdate,
};
