//! Training module
//!
//! - `pipeline`: curation -> split -> head training -> fine-tuning -> persistence
//! - `trainer`: the per-phase Burn training loop

pub mod pipeline;
pub mod trainer;

pub use pipeline::{ClassifierPipeline, PipelineState, TrainOutcome, TrainingReport};
pub use trainer::{EpochMetrics, PhaseReport, PhaseRunner, PhaseSettings, TrainingPhase};
