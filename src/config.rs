//! Pipeline configuration
//!
//! One serde-serializable structure drives curation, training and inference
//! so that both sides of the artifact agree on image size and architecture.
//! Missing fields in a JSON file fall back to the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::artifact::ArtifactPaths;
use crate::model::classifier::LeafClassifierConfig;
use crate::utils::error::{CropCareError, Result};

/// Image file extensions accepted by the curator (lower-case, no dot)
pub const DEFAULT_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub training: TrainingParams,
    pub artifacts: ArtifactConfig,
    /// Seed shared by the split shuffle, epoch shuffles and the backend RNG
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            model: ModelConfig::default(),
            training: TrainingParams::default(),
            artifacts: ArtifactConfig::default(),
            seed: 42,
        }
    }
}

/// Where the labelled images live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Root searched for a `train/` directory with class subdirectories
    pub data_root: PathBuf,
    /// Explicit class root; skips the `train/` search when set
    pub train_dir: Option<PathBuf>,
    /// Allowed image extensions (case-insensitive)
    pub extensions: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data/raw"),
            train_dir: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Architecture and input resolution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Square input resolution in pixels
    pub image_size: u32,
    /// Number of convolutional blocks in the backbone
    pub backbone_depth: usize,
    /// Filters in the first block; doubled per block up to 8x
    pub base_filters: usize,
    /// Width of the hidden dense layer in the head
    pub hidden_units: usize,
    /// Dropout rate applied twice in the head
    pub dropout: f64,
    /// Pretrained backbone record (CompactRecorder format)
    pub backbone_weights: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            backbone_depth: 5,
            base_filters: 32,
            hidden_units: 256,
            dropout: 0.3,
            backbone_weights: None,
        }
    }
}

/// Two-phase training schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingParams {
    pub batch_size: usize,
    /// Fraction of curated samples held out for validation, in [0, 1)
    pub validation_fraction: f64,
    /// Phase 1: epochs with the whole backbone frozen
    pub head_epochs: usize,
    pub head_learning_rate: f64,
    /// Phase 2: epochs with the backbone partially unfrozen
    pub fine_tune_epochs: usize,
    pub fine_tune_learning_rate: f64,
    /// Leading backbone blocks that stay frozen during phase 2
    pub fine_tune_frozen_blocks: usize,
    /// Decode every training image once and keep it in memory
    pub cache_images: bool,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            batch_size: 32,
            validation_fraction: 0.2,
            head_epochs: 20,
            head_learning_rate: 1e-3,
            fine_tune_epochs: 3,
            fine_tune_learning_rate: 1e-5,
            fine_tune_frozen_blocks: 3,
            cache_images: false,
        }
    }
}

/// Where the trained artifact is written and read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArtifactConfig {
    pub models_dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CropCareError::Configuration(format!("Cannot read config {:?}: {}", path, e))
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        let training = &self.training;

        if self.data.extensions.is_empty() {
            return Err(config_err("at least one image extension is required"));
        }
        if model.backbone_depth == 0 {
            return Err(config_err("backbone_depth must be at least 1"));
        }
        // Every block halves the resolution.
        if model.backbone_depth >= 32 || (model.image_size >> model.backbone_depth) == 0 {
            return Err(config_err(&format!(
                "image_size {} is too small for {} backbone blocks",
                model.image_size, model.backbone_depth
            )));
        }
        if model.base_filters == 0 || model.hidden_units == 0 {
            return Err(config_err("base_filters and hidden_units must be positive"));
        }
        if !(0.0..1.0).contains(&model.dropout) {
            return Err(config_err("dropout must be in range [0.0, 1.0)"));
        }
        if training.batch_size == 0 {
            return Err(config_err("batch_size must be positive"));
        }
        if !(0.0..1.0).contains(&training.validation_fraction) {
            return Err(config_err("validation_fraction must be in range [0.0, 1.0)"));
        }
        if training.head_learning_rate <= 0.0 || training.fine_tune_learning_rate <= 0.0 {
            return Err(config_err("learning rates must be positive"));
        }
        if training.fine_tune_frozen_blocks > model.backbone_depth {
            return Err(config_err(&format!(
                "fine_tune_frozen_blocks ({}) exceeds backbone_depth ({})",
                training.fine_tune_frozen_blocks, model.backbone_depth
            )));
        }
        Ok(())
    }

    /// Architecture for a catalog of `num_classes` classes
    pub fn classifier_config(&self, num_classes: usize) -> LeafClassifierConfig {
        LeafClassifierConfig::new(num_classes)
            .with_backbone_depth(self.model.backbone_depth)
            .with_base_filters(self.model.base_filters)
            .with_hidden_units(self.model.hidden_units)
            .with_dropout(self.model.dropout)
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.artifacts.models_dir)
    }

    /// Extensions as borrowed strings, for the curator
    pub fn extensions(&self) -> Vec<&str> {
        self.data.extensions.iter().map(String::as_str).collect()
    }
}

fn config_err(msg: &str) -> CropCareError {
    CropCareError::Configuration(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.image_size, 224);
        assert_eq!(config.training.validation_fraction, 0.2);
        assert_eq!(config.seed, 42);
        assert_eq!(config.data.extensions.len(), 6);
    }

    #[test]
    fn test_rejects_bad_fraction() {
        let mut config = PipelineConfig::default();
        config.training.validation_fraction = 1.0;
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_too_many_frozen_blocks() {
        let mut config = PipelineConfig::default();
        config.training.fine_tune_frozen_blocks = config.model.backbone_depth + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_images() {
        let mut config = PipelineConfig::default();
        config.model.image_size = 16;
        config.model.backbone_depth = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "seed": 7, "training": { "head_epochs": 2 } }"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.training.head_epochs, 2);
        assert_eq!(config.training.batch_size, 32);

        let out = dir.path().join("saved.json");
        config.save(&out).unwrap();
        assert_eq!(PipelineConfig::load(&out).unwrap(), config);
    }

    #[test]
    fn test_missing_config_file_is_configuration_error() {
        let err = PipelineConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.is_configuration());
    }
}
