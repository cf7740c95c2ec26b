//! Model module
//!
//! - `classifier`: backbone + head and the freezing controls used by training
//! - `artifact`: saving and loading the trained model with its class catalog,
//!   and exporting its backbone as pretrained weights

pub mod artifact;
pub mod classifier;

pub use artifact::{export_backbone, load_catalog, load_model, ArtifactPaths, ArtifactWriter};
pub use classifier::{LeafClassifier, LeafClassifierConfig};
