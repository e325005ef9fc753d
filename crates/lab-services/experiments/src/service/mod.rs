pub mod comparison;
pub mod recorder;
pub mod run_guard;
pub mod training;

pub use comparison::{compare, experiment_detail, ExperimentComparison};
pub use recorder::ExperimentRecorder;
pub use run_guard::{RunGuard, RunPermit};
pub use training::{EvaluateOutcome, EvaluateRequest, TrainOutcome, TrainRequest, TrainingService};
