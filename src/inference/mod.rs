//! Inference module
//!
//! - `predictor`: class selection with the crop filter, and the loaded model
//! - `handle`: the shared handle that loads the artifact once, on demand

pub mod handle;
pub mod predictor;

pub use handle::ArtifactHandle;
pub use predictor::{select_class, FilterPolicy, LoadedModel, PredictionResult, TOP_K};
