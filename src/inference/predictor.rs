//! Prediction with a loaded artifact
//!
//! [`select_class`] turns a probability vector into a prediction, honouring an
//! optional crop filter. [`LoadedModel`] pairs the weights with the catalog
//! they were trained against and runs the shared preprocessing path.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use burn::tensor::backend::Backend;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::dataset::catalog::ClassCatalog;
use crate::dataset::preprocess::{load_image, preprocess, to_batch_tensor};
use crate::model::artifact::{load_catalog, load_model};
use crate::model::classifier::LeafClassifier;
use crate::utils::error::{CropCareError, Result};

/// Number of alternatives kept in [`PredictionResult::top_k`]
pub const TOP_K: usize = 5;

/// What to do when a crop filter matches no class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPolicy {
    /// Ignore the filter and take the arg-max over every class
    #[default]
    FallbackToGlobal,
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Index into the catalog
    pub class_index: usize,
    pub class_name: String,
    /// Probability of the chosen class over all classes (not renormalised
    /// to the filtered subset)
    pub confidence: f32,
    /// Full probability distribution, indexed like the catalog
    pub probabilities: Vec<f32>,
    /// Highest-probability classes overall, best first
    pub top_k: Vec<(usize, String, f32)>,
    /// Crop filter as given, if any
    pub crop_filter: Option<String>,
    /// False when a filter was given but matched no class
    pub filter_matched: bool,
    pub inference_time_ms: f64,
}

impl PredictionResult {
    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "Prediction: {} (class {})\n",
            self.class_name, self.class_index
        ));
        output.push_str(&format!("Confidence: {:.2}%\n", self.confidence * 100.0));
        if let Some(filter) = &self.crop_filter {
            let note = if self.filter_matched { "" } else { " (no match, all classes used)" };
            output.push_str(&format!("Crop filter: {}{}\n", filter, note));
        }
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));

        output.push_str(&format!("\nTop-{} predictions:\n", self.top_k.len()));
        for (i, (idx, name, prob)) in self.top_k.iter().enumerate() {
            output.push_str(&format!(
                "  {}. {} (class {}) - {:.2}%\n",
                i + 1,
                name,
                idx,
                prob * 100.0
            ));
        }
        output
    }
}

/// Index of the largest probability among `candidates`; ties go to the first
fn argmax_over(probabilities: &[f32], candidates: impl Iterator<Item = usize>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for idx in candidates {
        let p = probabilities[idx];
        match best {
            None => best = Some((idx, p)),
            Some((_, best_p)) if p > best_p => best = Some((idx, p)),
            _ => {}
        }
    }
    best.map(|(idx, _)| idx)
}

/// Pick the predicted class.
///
/// A non-blank `crop_filter` restricts the arg-max to classes whose name
/// starts with it (case-insensitive, surrounding whitespace included). When
/// nothing matches, `policy` decides.
pub fn select_class(
    probabilities: &[f32],
    catalog: &ClassCatalog,
    crop_filter: Option<&str>,
    policy: FilterPolicy,
) -> Result<PredictionResult> {
    if probabilities.len() != catalog.len() {
        return Err(CropCareError::Inference(format!(
            "model produced {} probabilities for {} classes",
            probabilities.len(),
            catalog.len()
        )));
    }
    if catalog.is_empty() {
        return Err(CropCareError::Inference("class catalog is empty".to_string()));
    }

    // Matched as given; only an empty or all-whitespace filter is ignored.
    let filter = crop_filter.filter(|f| !f.trim().is_empty());
    let candidates = filter.map(|f| catalog.indices_with_prefix(f)).unwrap_or_default();

    let (chosen, filter_matched) = if candidates.is_empty() {
        if let Some(f) = filter {
            match policy {
                FilterPolicy::FallbackToGlobal => {
                    debug!("Crop filter '{}' matched no class; using all classes", f)
                }
            }
        }
        (argmax_over(probabilities, 0..probabilities.len()), filter.is_none())
    } else {
        (argmax_over(probabilities, candidates.into_iter()), true)
    };
    let class_index = chosen.unwrap_or(0);

    let mut ranked: Vec<usize> = (0..probabilities.len()).collect();
    ranked.sort_by(|&a, &b| {
        probabilities[b]
            .partial_cmp(&probabilities[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let top_k = ranked
        .into_iter()
        .take(TOP_K)
        .map(|idx| (idx, catalog.get(idx).unwrap_or_default().to_string(), probabilities[idx]))
        .collect();

    Ok(PredictionResult {
        class_index,
        class_name: catalog.get(class_index).unwrap_or_default().to_string(),
        confidence: probabilities[class_index],
        probabilities: probabilities.to_vec(),
        top_k,
        crop_filter: crop_filter.map(str::to_string),
        filter_matched,
        inference_time_ms: 0.0,
    })
}

/// A trained model together with its catalog
#[derive(Debug)]
pub struct LoadedModel<B: Backend> {
    // Modules are Send but not necessarily Sync; callers clone under a short lock.
    model: Mutex<LeafClassifier<B>>,
    catalog: ClassCatalog,
    image_size: u32,
    device: B::Device,
    policy: FilterPolicy,
}

impl<B: Backend> LoadedModel<B> {
    pub fn new(model: LeafClassifier<B>, catalog: ClassCatalog, image_size: u32, device: B::Device) -> Self {
        Self {
            model: Mutex::new(model),
            catalog,
            image_size,
            device,
            policy: FilterPolicy::default(),
        }
    }

    /// Load the committed artifact described by `config`
    pub fn load(config: &PipelineConfig, device: &B::Device) -> Result<Self> {
        let paths = config.artifact_paths();
        let catalog = load_catalog(&paths)?;
        let model = load_model::<B>(&paths, &config.classifier_config(catalog.len()), device)?;
        Ok(Self::new(model, catalog, config.model.image_size, device.clone()))
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    fn model(&self) -> Result<LeafClassifier<B>> {
        self.model
            .lock()
            .map(|model| model.clone())
            .map_err(|_| CropCareError::Inference("model lock poisoned".to_string()))
    }

    /// Class probabilities for one image
    pub fn probabilities(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let input = to_batch_tensor::<B>(preprocess(image, self.image_size), self.image_size, &self.device);
        let output = self.model()?.forward_softmax(input);
        output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| CropCareError::Inference(format!("{:?}", e)))
    }

    pub fn predict(&self, image: &DynamicImage, crop_filter: Option<&str>) -> Result<PredictionResult> {
        let start = Instant::now();
        let probabilities = self.probabilities(image)?;
        let mut result = select_class(&probabilities, &self.catalog, crop_filter, self.policy)?;
        result.inference_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        Ok(result)
    }

    pub fn predict_file(&self, path: &Path, crop_filter: Option<&str>) -> Result<PredictionResult> {
        self.predict(&load_image(path)?, crop_filter)
    }
}
