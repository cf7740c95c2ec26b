//! Trained artifact persistence
//!
//! An artifact is the pair `leaf_model.mpk` (weights, CompactRecorder) and
//! `class_names.json` (the catalog, in model output order). The two are only
//! valid together.
//!
//! `class_names.json` doubles as the commit marker: it is removed before new
//! weights are written and renamed into place last, so an interrupted save
//! never leaves a catalog next to mismatched weights. Readers treat a missing
//! file of either kind as "not trained yet".
//!
//! The backbone of a trained model can also be exported on its own
//! (`backbone.mpk` by default) and fed back as `model.backbone_weights`.

use std::path::{Path, PathBuf};

use burn::{module::Module, record::CompactRecorder, tensor::backend::Backend};
use tracing::{debug, info};

use crate::dataset::catalog::ClassCatalog;
use crate::model::classifier::{LeafClassifier, LeafClassifierConfig};
use crate::utils::error::{CropCareError, Result};

const MODEL_STEM: &str = "leaf_model";
const STAGING_STEM: &str = "leaf_model_staging";
const CLASS_NAMES_FILE: &str = "class_names.json";
const CLASS_NAMES_STAGING: &str = "class_names.json.tmp";
const REPORT_FILE: &str = "training_report.json";
const BACKBONE_STEM: &str = "backbone";
/// Extension CompactRecorder appends to the stem
pub const MODEL_EXTENSION: &str = "mpk";

/// Locations of the artifact files inside a models directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new<P: AsRef<Path>>(models_dir: P) -> Self {
        Self {
            dir: models_dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path handed to the recorder (it adds the extension itself)
    pub fn model_stem(&self) -> PathBuf {
        self.dir.join(MODEL_STEM)
    }

    pub fn model_file(&self) -> PathBuf {
        self.model_stem().with_extension(MODEL_EXTENSION)
    }

    pub fn class_names_file(&self) -> PathBuf {
        self.dir.join(CLASS_NAMES_FILE)
    }

    pub fn report_file(&self) -> PathBuf {
        self.dir.join(REPORT_FILE)
    }

    /// Default destination of [`export_backbone`]
    pub fn backbone_file(&self) -> PathBuf {
        self.dir.join(BACKBONE_STEM).with_extension(MODEL_EXTENSION)
    }

    /// Both halves of the artifact are on disk
    pub fn exists(&self) -> bool {
        self.model_file().is_file() && self.class_names_file().is_file()
    }

    fn staging_stem(&self) -> PathBuf {
        self.dir.join(STAGING_STEM)
    }

    fn class_names_staging(&self) -> PathBuf {
        self.dir.join(CLASS_NAMES_STAGING)
    }
}

/// Writes a model and its catalog as one unit
pub struct ArtifactWriter<'a> {
    paths: &'a ArtifactPaths,
}

impl<'a> ArtifactWriter<'a> {
    pub fn new(paths: &'a ArtifactPaths) -> Self {
        Self { paths }
    }

    pub fn commit<B: Backend>(&self, model: &LeafClassifier<B>, catalog: &ClassCatalog) -> Result<()> {
        if model.num_classes() != catalog.len() {
            return Err(CropCareError::Model(format!(
                "model has {} outputs but catalog has {} classes",
                model.num_classes(),
                catalog.len()
            )));
        }

        let paths = self.paths;
        std::fs::create_dir_all(paths.dir())?;

        let marker = paths.class_names_file();
        if marker.exists() {
            std::fs::remove_file(&marker)?;
            debug!("Removed previous commit marker {:?}", marker);
        }

        let recorder = CompactRecorder::new();
        model
            .clone()
            .save_file(paths.staging_stem(), &recorder)
            .map_err(|e| CropCareError::Recorder(format!("Failed to save model: {:?}", e)))?;
        std::fs::rename(
            paths.staging_stem().with_extension(MODEL_EXTENSION),
            paths.model_file(),
        )?;

        catalog.save(&paths.class_names_staging())?;
        std::fs::rename(paths.class_names_staging(), &marker)?;

        info!(
            "Saved model to {:?} and {} class names to {:?}",
            paths.model_file(),
            catalog.len(),
            marker
        );
        Ok(())
    }
}

/// Read the catalog of a committed artifact
pub fn load_catalog(paths: &ArtifactPaths) -> Result<ClassCatalog> {
    if !paths.exists() {
        return Err(CropCareError::ModelNotReady(paths.dir().to_path_buf()));
    }
    ClassCatalog::load(&paths.class_names_file())
}

/// Rebuild the architecture for `catalog` and load the committed weights
pub fn load_model<B: Backend>(
    paths: &ArtifactPaths,
    config: &LeafClassifierConfig,
    device: &B::Device,
) -> Result<LeafClassifier<B>> {
    if !paths.exists() {
        return Err(CropCareError::ModelNotReady(paths.dir().to_path_buf()));
    }

    let model = config
        .init::<B>(device)
        .load_file(paths.model_stem(), &CompactRecorder::new(), device)
        .map_err(|e| CropCareError::Recorder(format!("Failed to load model: {:?}", e)))?;

    info!("Loaded model from {:?}", paths.model_file());
    Ok(model)
}

/// Save only the backbone of `model`, for use as pretrained weights.
///
/// Returns the file written (the recorder sets the `.mpk` extension).
pub fn export_backbone<B: Backend>(model: &LeafClassifier<B>, output: &Path) -> Result<PathBuf> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    model
        .backbone
        .clone()
        .save_file(output, &CompactRecorder::new())
        .map_err(|e| CropCareError::Recorder(format!("Failed to save backbone: {:?}", e)))?;

    let written = output.with_extension(MODEL_EXTENSION);
    info!(
        "Exported {}-block backbone to {:?}",
        model.backbone.depth(),
        written
    );
    Ok(written)
}
