//! Classifier pipeline (training side)
//!
//! Drives curation, splitting, the two training phases and persistence:
//!
//! ```text
//! Uninitialized -> Curated -> Split -> Trained(HeadOnly) -> Trained(FineTune) -> Persisted
//! Uninitialized -> Loaded            (artifact already on disk, no retraining)
//! ```
//!
//! Training is idempotent: when a committed artifact exists, `train` loads it
//! and returns [`TrainOutcome::AlreadyTrained`] unless `force` is set.

use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::dataset::burn_dataset::LeafDataset;
use crate::dataset::catalog::ClassCatalog;
use crate::dataset::curator::{curate, locate_train_dir, CurationReport};
use crate::dataset::split::split_samples;
use crate::model::artifact::{export_backbone, load_catalog, load_model, ArtifactWriter};
use crate::training::trainer::{PhaseReport, PhaseRunner, PhaseSettings, TrainingPhase};
use crate::utils::error::{CropCareError, Result};

/// Where the pipeline is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Curated,
    Split,
    Trained(TrainingPhase),
    Persisted,
    Loaded,
}

/// Result of [`ClassifierPipeline::train`]
#[derive(Debug, Clone)]
pub enum TrainOutcome {
    /// A new artifact was trained and committed
    Trained(TrainingReport),
    /// An artifact was already present and has been loaded instead
    AlreadyTrained { catalog: ClassCatalog },
}

/// Written next to the artifact after a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub backend: String,
    pub class_root: PathBuf,
    pub class_names: Vec<String>,
    pub curated_samples: usize,
    pub skipped_files: usize,
    pub train_size: usize,
    pub validation_size: usize,
    /// Training samples per class, indexed like `class_names`
    #[serde(default)]
    pub train_per_class: Vec<usize>,
    /// Validation samples per class, indexed like `class_names`
    #[serde(default)]
    pub validation_per_class: Vec<usize>,
    pub image_size: u32,
    pub seed: u64,
    /// Pretrained backbone the run started from, if any
    #[serde(default)]
    pub backbone_weights: Option<PathBuf>,
    pub phases: Vec<PhaseReport>,
}

impl TrainingReport {
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Validation accuracy of the final model
    pub fn final_val_accuracy(&self) -> f64 {
        self.phases
            .iter()
            .rev()
            .find(|p| !p.epochs.is_empty())
            .map(|p| p.final_val_accuracy())
            .unwrap_or(0.0)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Curates, trains and persists the leaf classifier
pub struct ClassifierPipeline<B: AutodiffBackend> {
    config: PipelineConfig,
    device: B::Device,
    state: PipelineState,
    force: bool,
}

impl<B: AutodiffBackend> ClassifierPipeline<B> {
    pub fn new(config: PipelineConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            state: PipelineState::Uninitialized,
            force: false,
        }
    }

    /// Retrain even when an artifact already exists
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("Pipeline state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Directory whose subdirectories are the classes
    pub fn class_root(&self) -> Result<PathBuf> {
        match &self.config.data.train_dir {
            Some(dir) => Ok(dir.clone()),
            None => locate_train_dir(&self.config.data.data_root),
        }
    }

    /// Run the curator without training
    pub fn curate(&self) -> Result<CurationReport> {
        self.config.validate()?;
        let class_root = self.class_root()?;
        curate(&class_root, &self.config.extensions())
    }

    /// Save the backbone of the committed artifact to `output`.
    ///
    /// Point `model.backbone_weights` at the returned file to start later
    /// runs (same backbone depth and filters) from these weights.
    pub fn export_backbone(&self, output: &Path) -> Result<PathBuf> {
        let paths = self.config.artifact_paths();
        let catalog = load_catalog(&paths)?;
        let classifier_config = self.config.classifier_config(catalog.len());
        let model = load_model::<B::InnerBackend>(&paths, &classifier_config, &self.device)?;
        export_backbone(&model, output)
    }

    /// Train and persist a model, or load the existing one
    pub fn train(&mut self) -> Result<TrainOutcome> {
        self.config.validate()?;
        let paths = self.config.artifact_paths();

        if paths.exists() && !self.force {
            let catalog = load_catalog(&paths)?;
            let classifier_config = self.config.classifier_config(catalog.len());
            load_model::<B::InnerBackend>(&paths, &classifier_config, &self.device)?;
            self.transition(PipelineState::Loaded);
            info!(
                "Model already trained ({} classes at {:?}); skipping training",
                catalog.len(),
                paths.dir()
            );
            return Ok(TrainOutcome::AlreadyTrained { catalog });
        }
        if paths.exists() {
            info!("Retraining over existing artifact at {:?}", paths.dir());
        }

        let started_at = Utc::now();
        let seed = self.config.seed;
        B::seed(seed);

        let curation = self.curate()?;
        if curation.samples.is_empty() {
            return Err(CropCareError::Configuration(format!(
                "No valid images found under {:?}",
                curation.class_root
            )));
        }
        self.transition(PipelineState::Curated);

        let training = self.config.training.clone();
        let split = split_samples(&curation.samples, training.validation_fraction, seed)?;
        if split.train.is_empty() {
            return Err(CropCareError::Configuration(format!(
                "Validation fraction {} leaves no training samples out of {}",
                training.validation_fraction,
                curation.samples.len()
            )));
        }
        let split_stats = split.stats(curation.num_classes());
        info!(
            "Train samples: {}, Validation samples: {}",
            split_stats.train_size, split_stats.validation_size
        );
        for (name, (train_count, val_count)) in curation.catalog.names().iter().zip(
            split_stats
                .train_per_class
                .iter()
                .zip(&split_stats.validation_per_class),
        ) {
            debug!("  {}: {} train / {} validation", name, train_count, val_count);
            if *train_count == 0 {
                warn!("Class {} has no training samples", name);
            }
        }
        self.transition(PipelineState::Split);

        let image_size = self.config.model.image_size;
        let (train_set, validation_set) = if training.cache_images {
            info!("Pre-loading images into memory...");
            (
                LeafDataset::new_cached(split.train.clone(), image_size)?,
                LeafDataset::new_cached(split.validation.clone(), image_size)?,
            )
        } else {
            (
                LeafDataset::new(split.train.clone(), image_size),
                LeafDataset::new(split.validation.clone(), image_size),
            )
        };

        let catalog = curation.catalog.clone();
        let classifier_config = self.config.classifier_config(catalog.len());
        let mut model = classifier_config.init::<B>(&self.device);
        match &self.config.model.backbone_weights {
            Some(weights) => {
                model = model.load_backbone_weights(weights, &self.device)?;
            }
            None => warn!(
                "No pretrained backbone configured; backbone starts from random weights \
                 (export one from a trained model with `cropcare export-backbone`)"
            ),
        }

        let mut runner = PhaseRunner::<B>::new(
            &train_set,
            &validation_set,
            training.batch_size,
            seed,
            self.device.clone(),
        );

        info!("Phase 1: training head ({} epochs)", training.head_epochs);
        let head = PhaseSettings {
            phase: TrainingPhase::HeadOnly,
            epochs: training.head_epochs,
            learning_rate: training.head_learning_rate,
            frozen_blocks: classifier_config.backbone_depth,
        };
        let (model, head_report) = runner.run(model.freeze_backbone(), &head)?;
        self.transition(PipelineState::Trained(TrainingPhase::HeadOnly));

        info!(
            "Phase 2: fine-tuning with first {} backbone blocks frozen ({} epochs)",
            training.fine_tune_frozen_blocks, training.fine_tune_epochs
        );
        let fine_tune = PhaseSettings {
            phase: TrainingPhase::FineTune,
            epochs: training.fine_tune_epochs,
            learning_rate: training.fine_tune_learning_rate,
            frozen_blocks: training.fine_tune_frozen_blocks,
        };
        let (model, fine_tune_report) = runner.run(model, &fine_tune)?;
        self.transition(PipelineState::Trained(TrainingPhase::FineTune));

        ArtifactWriter::new(&paths).commit(&model, &catalog)?;
        self.transition(PipelineState::Persisted);

        let report = TrainingReport {
            started_at,
            finished_at: Utc::now(),
            backend: crate::backend::backend_name().to_string(),
            class_root: curation.class_root.clone(),
            class_names: catalog.names().to_vec(),
            curated_samples: curation.samples.len(),
            skipped_files: curation.skipped(),
            train_size: split_stats.train_size,
            validation_size: split_stats.validation_size,
            train_per_class: split_stats.train_per_class,
            validation_per_class: split_stats.validation_per_class,
            image_size,
            seed,
            backbone_weights: self.config.model.backbone_weights.clone(),
            phases: vec![head_report, fine_tune_report],
        };
        if let Err(e) = report.save(&paths.report_file()) {
            warn!("Could not write training report: {}", e);
        }

        info!(
            "Training complete. Final validation accuracy: {:.2}%",
            report.final_val_accuracy() * 100.0
        );
        Ok(TrainOutcome::Trained(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_support::{write_class_tree, write_corrupt};
    use crate::model::artifact::ArtifactPaths;
    use burn::backend::Autodiff;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn tiny_config(root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.data.data_root = root.join("data");
        config.artifacts.models_dir = root.join("models");
        config.model.image_size = 32;
        config.model.backbone_depth = 2;
        config.model.base_filters = 4;
        config.model.hidden_units = 8;
        config.training.batch_size = 8;
        config.training.head_epochs = 1;
        config.training.fine_tune_epochs = 1;
        config.training.fine_tune_frozen_blocks = 1;
        config
    }

    fn write_dataset(root: &Path) {
        write_class_tree(
            &root.join("data/plantvillage/train"),
            &[("Apple___healthy", 10, [20, 180, 20]), ("Apple___scab", 10, [120, 80, 20])],
        );
    }

    #[test]
    fn test_train_then_short_circuit() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path());
        let config = tiny_config(dir.path());
        let paths = ArtifactPaths::new(dir.path().join("models"));

        let mut pipeline = ClassifierPipeline::<TestBackend>::new(config.clone(), NdArrayDevice::default());
        let report = match pipeline.train().unwrap() {
            TrainOutcome::Trained(report) => report,
            other => panic!("expected a fresh training run, got {:?}", other),
        };
        assert_eq!(pipeline.state(), PipelineState::Persisted);
        assert_eq!(report.train_size, 16);
        assert_eq!(report.validation_size, 4);
        assert_eq!(report.num_classes(), 2);
        assert_eq!(report.phases.len(), 2);
        assert!(paths.exists());
        assert_eq!(report.train_per_class.iter().sum::<usize>(), 16);
        assert_eq!(report.validation_per_class.iter().sum::<usize>(), 4);

        let saved = TrainingReport::load(&paths.report_file()).unwrap();
        assert_eq!(saved.class_names, report.class_names);
        assert_eq!(saved.train_per_class, report.train_per_class);
        assert_eq!(saved.phases.len(), 2);
        assert_eq!(
            load_catalog(&paths).unwrap().names(),
            &["Apple___healthy", "Apple___scab"]
        );

        let mut again = ClassifierPipeline::<TestBackend>::new(config, NdArrayDevice::default());
        match again.train().unwrap() {
            TrainOutcome::AlreadyTrained { catalog } => assert_eq!(catalog.len(), 2),
            other => panic!("expected short-circuit, got {:?}", other),
        }
        assert_eq!(again.state(), PipelineState::Loaded);
    }

    #[test]
    fn test_force_retrains() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path());
        let mut config = tiny_config(dir.path());
        config.training.fine_tune_epochs = 0;

        let mut first = ClassifierPipeline::<TestBackend>::new(config.clone(), NdArrayDevice::default());
        first.train().unwrap();

        let mut forced = ClassifierPipeline::<TestBackend>::new(config, NdArrayDevice::default()).with_force(true);
        assert!(matches!(forced.train().unwrap(), TrainOutcome::Trained(_)));
    }

    #[test]
    fn test_corrupt_files_are_skipped_during_training() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path());
        write_corrupt(&dir.path().join("data/plantvillage/train/Apple___scab/zz_broken.jpg"));
        let mut config = tiny_config(dir.path());
        config.training.head_epochs = 1;
        config.training.fine_tune_epochs = 0;

        let mut pipeline = ClassifierPipeline::<TestBackend>::new(config, NdArrayDevice::default());
        match pipeline.train().unwrap() {
            TrainOutcome::Trained(report) => {
                assert_eq!(report.curated_samples, 20);
                assert_eq!(report.skipped_files, 1);
            }
            other => panic!("expected training, got {:?}", other),
        }
    }

    #[test]
    fn test_exported_backbone_seeds_a_new_run() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path());
        let config = tiny_config(dir.path());

        let mut first = ClassifierPipeline::<TestBackend>::new(config.clone(), NdArrayDevice::default());
        first.train().unwrap();
        let backbone = first
            .export_backbone(&config.artifact_paths().backbone_file())
            .unwrap();
        assert!(backbone.is_file());

        let mut second_config = config.clone();
        second_config.artifacts.models_dir = dir.path().join("models_pretrained");
        second_config.model.backbone_weights = Some(backbone.clone());
        let mut second = ClassifierPipeline::<TestBackend>::new(second_config.clone(), NdArrayDevice::default());
        match second.train().unwrap() {
            TrainOutcome::Trained(report) => assert_eq!(report.backbone_weights, Some(backbone)),
            other => panic!("expected training, got {:?}", other),
        }
        assert!(second_config.artifact_paths().exists());
    }

    #[test]
    fn test_export_without_artifact_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let config = tiny_config(dir.path());
        let pipeline = ClassifierPipeline::<TestBackend>::new(config, NdArrayDevice::default());
        let err = pipeline.export_backbone(&dir.path().join("backbone")).unwrap_err();
        assert!(err.is_model_not_ready());
    }

    #[test]
    fn test_missing_data_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let config = tiny_config(dir.path());

        let mut pipeline = ClassifierPipeline::<TestBackend>::new(config, NdArrayDevice::default());
        let err = pipeline.train().unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        assert!(!ArtifactPaths::new(dir.path().join("models")).exists());
    }

    #[test]
    fn test_class_dirs_without_images_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let class_root = dir.path().join("classes");
        std::fs::create_dir_all(class_root.join("Apple___healthy")).unwrap();
        std::fs::write(class_root.join("Apple___healthy/readme.txt"), "no images").unwrap();

        let mut config = tiny_config(dir.path());
        config.data.train_dir = Some(class_root);

        let mut pipeline = ClassifierPipeline::<TestBackend>::new(config, NdArrayDevice::default());
        assert!(pipeline.train().unwrap_err().is_configuration());
    }
}
