//! Shared, lazily loaded model handle
//!
//! The handle is created once and passed explicitly to whoever predicts (the
//! CLI, each HTTP handler). The first `get` loads the artifact; callers that
//! arrive during that load wait on the same lock and reuse the result, so the
//! artifact is read at most once per successful load. A failed load is not
//! remembered: the next call tries again, which lets a server start before
//! any model has been trained.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use burn::tensor::backend::Backend;
use image::DynamicImage;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::inference::predictor::{LoadedModel, PredictionResult};
use crate::utils::error::{CropCareError, Result};

pub struct ArtifactHandle<B: Backend> {
    config: PipelineConfig,
    device: B::Device,
    slot: Mutex<Option<Arc<LoadedModel<B>>>>,
    // Readable without the slot lock, which is held for the whole load.
    ready: AtomicBool,
    loads: AtomicUsize,
}

impl<B: Backend> ArtifactHandle<B> {
    pub fn new(config: PipelineConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            slot: Mutex::new(None),
            ready: AtomicBool::new(false),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The loaded model, loading it on first use
    pub fn get(&self) -> Result<Arc<LoadedModel<B>>> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| CropCareError::Inference("model slot lock poisoned".to_string()))?;

        if let Some(loaded) = slot.as_ref() {
            return Ok(Arc::clone(loaded));
        }

        let loaded = Arc::new(LoadedModel::load(&self.config, &self.device)?);
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
        info!(
            "Model loaded with {} classes",
            loaded.catalog().len()
        );
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Whether a model is currently held; never blocks, even mid-load
    pub fn is_loaded(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Number of successful artifact loads so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Try to load eagerly; a missing artifact is logged, not fatal
    pub fn warm_up(&self) -> bool {
        match self.get() {
            Ok(_) => true,
            Err(e) if e.is_model_not_ready() => {
                warn!("{}. Predictions will fail until a model is trained.", e);
                false
            }
            Err(e) => {
                warn!("Could not load model: {}", e);
                false
            }
        }
    }

    /// Runs outside the slot lock, so concurrent predictions do not serialise
    pub fn predict(&self, image: &DynamicImage, crop_filter: Option<&str>) -> Result<PredictionResult> {
        self.get()?.predict(image, crop_filter)
    }

    pub fn predict_file(&self, path: &Path, crop_filter: Option<&str>) -> Result<PredictionResult> {
        self.get()?.predict_file(path, crop_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::catalog::ClassCatalog;
    use crate::model::artifact::ArtifactWriter;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn tiny_config(models_dir: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.artifacts.models_dir = models_dir.to_path_buf();
        config.model.image_size = 16;
        config.model.backbone_depth = 2;
        config.model.base_filters = 4;
        config.model.hidden_units = 8;
        config.training.fine_tune_frozen_blocks = 1;
        config
    }

    fn write_artifact(config: &PipelineConfig) {
        let catalog = ClassCatalog::from_names(vec![
            "Corn___Common_rust".into(),
            "Corn___healthy".into(),
            "Grape___Black_rot".into(),
        ]);
        let device = NdArrayDevice::default();
        let model = config.classifier_config(catalog.len()).init::<TestBackend>(&device);
        ArtifactWriter::new(&config.artifact_paths()).commit(&model, &catalog).unwrap();
    }

    fn leaf() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 24, Rgb([30, 140, 30])))
    }

    #[test]
    fn test_missing_artifact_is_not_ready_and_not_cached() {
        let dir = TempDir::new().unwrap();
        let config = tiny_config(&dir.path().join("models"));
        let handle = ArtifactHandle::<TestBackend>::new(config.clone(), NdArrayDevice::default());

        let err = handle.predict(&leaf(), None).unwrap_err();
        assert!(err.is_model_not_ready());
        assert!(!handle.is_loaded());
        assert!(!handle.warm_up());
        assert_eq!(handle.load_count(), 0);

        // Training finishes later; the same handle picks it up.
        write_artifact(&config);
        let result = handle.predict(&leaf(), Some("grape")).unwrap();
        assert_eq!(result.class_name, "Grape___Black_rot");
        assert!(handle.is_loaded());
        assert_eq!(handle.load_count(), 1);
    }

    #[test]
    fn test_loads_once_across_calls() {
        let dir = TempDir::new().unwrap();
        let config = tiny_config(dir.path());
        write_artifact(&config);
        let handle = ArtifactHandle::<TestBackend>::new(config, NdArrayDevice::default());

        assert!(handle.warm_up());
        for _ in 0..3 {
            handle.predict(&leaf(), None).unwrap();
        }
        assert_eq!(handle.load_count(), 1);
    }

    #[test]
    fn test_concurrent_first_calls_load_once() {
        let dir = TempDir::new().unwrap();
        let config = tiny_config(dir.path());
        write_artifact(&config);
        let handle = Arc::new(ArtifactHandle::<TestBackend>::new(config, NdArrayDevice::default()));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || handle.predict(&leaf(), Some("corn")).unwrap())
            })
            .collect();

        for thread in threads {
            let result = thread.join().unwrap();
            assert!(result.class_name.starts_with("Corn"));
        }
        assert_eq!(handle.load_count(), 1);
    }

    #[test]
    fn test_readiness_does_not_wait_for_a_load_in_progress() {
        let dir = TempDir::new().unwrap();
        let config = tiny_config(dir.path());
        write_artifact(&config);
        let handle = ArtifactHandle::<TestBackend>::new(config, NdArrayDevice::default());

        {
            // Stand in for a slow first load holding the slot.
            let _slot = handle.slot.lock().unwrap();
            assert!(!handle.is_loaded());
        }

        handle.get().unwrap();
        assert!(handle.is_loaded());
    }

    #[test]
    fn test_predict_file() {
        let dir = TempDir::new().unwrap();
        let config = tiny_config(&dir.path().join("models"));
        write_artifact(&config);
        let handle = ArtifactHandle::<TestBackend>::new(config, NdArrayDevice::default());

        let path = dir.path().join("leaf.png");
        crate::dataset::test_support::write_png(&path, 20, [10, 120, 10]);
        let result = handle.predict_file(&path, None).unwrap();
        assert_eq!(result.probabilities.len(), 3);

        let err = handle.predict_file(&dir.path().join("missing.png"), None).unwrap_err();
        assert!(matches!(err, CropCareError::Image(_, _)));
    }
}
