//! # cropcare
//!
//! Plant leaf disease classification with the Burn framework.
//!
//! ## Features
//!
//! - **Dataset curation**: walks `<class>/<image>` trees, skipping files that
//!   do not decode, and fixes the class catalog
//! - **Two-phase training**: head-only training on a frozen backbone, then
//!   fine-tuning of the later blocks at a lower learning rate
//! - **Artifact persistence**: weights and class catalog written as one unit
//! - **Inference**: a shared handle that loads the model once, with an
//!   optional crop filter on the predicted class
//! - **Diagnosis service**: an axum HTTP API with readable labels, severity,
//!   care suggestions and a chat assistant
//!
//! ## Modules
//!
//! - `dataset`: curation, deterministic split, preprocessing, Burn dataset glue
//! - `model`: classifier architecture and artifact persistence
//! - `training`: the training pipeline and per-phase loop
//! - `inference`: class selection and the lazily loaded model handle
//! - `diagnosis`: labels, severity, descriptions and product tables
//! - `server`: HTTP routes and the chat client
//! - `utils`: errors and logging
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cropcare::backend::{default_device, InferenceBackend, TrainingBackend};
//! use cropcare::{ArtifactHandle, ClassifierPipeline, PipelineConfig};
//!
//! let config = PipelineConfig::default();
//! ClassifierPipeline::<TrainingBackend>::new(config.clone(), default_device()).train()?;
//!
//! let handle = ArtifactHandle::<InferenceBackend>::new(config, default_device());
//! let prediction = handle.predict_file("leaf.jpg".as_ref(), Some("tomato"))?;
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod diagnosis;
pub mod inference;
pub mod model;
pub mod server;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::PipelineConfig;
pub use dataset::{curate, split_samples, ClassCatalog, CurationReport, LabeledSample, TrainValSplit};
pub use diagnosis::{Diagnosis, Severity};
pub use inference::{select_class, ArtifactHandle, FilterPolicy, LoadedModel, PredictionResult};
pub use model::{ArtifactPaths, LeafClassifier, LeafClassifierConfig};
pub use training::{ClassifierPipeline, TrainOutcome, TrainingReport};
pub use utils::error::{CropCareError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
