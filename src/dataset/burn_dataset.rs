//! Burn Dataset integration
//!
//! Implements Burn's `Dataset` trait over curated samples and a `Batcher`
//! that stacks preprocessed items into training tensors.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use tracing::warn;

use crate::dataset::curator::LabeledSample;
use crate::dataset::preprocess::{load_preprocessed, CHANNELS};
use crate::utils::error::Result;

/// A preprocessed image ready for batching
#[derive(Clone, Debug)]
pub struct LeafItem {
    /// Flattened CHW floats, `3 * size * size`
    pub image: Vec<f32>,
    /// Class index
    pub label: usize,
}

impl LeafItem {
    pub fn from_sample(sample: &LabeledSample, image_size: u32) -> Result<Self> {
        Ok(Self {
            image: load_preprocessed(&sample.path, image_size)?,
            label: sample.class_index,
        })
    }
}

/// Dataset over curated samples; images are decoded on demand unless cached
#[derive(Debug, Clone)]
pub struct LeafDataset {
    samples: Vec<LabeledSample>,
    image_size: u32,
    cached_items: Option<Vec<LeafItem>>,
}

impl LeafDataset {
    pub fn new(samples: Vec<LabeledSample>, image_size: u32) -> Self {
        Self {
            samples,
            image_size,
            cached_items: None,
        }
    }

    /// Decode every sample up front and keep the tensors in memory
    pub fn new_cached(samples: Vec<LabeledSample>, image_size: u32) -> Result<Self> {
        let cached_items = samples
            .iter()
            .map(|sample| LeafItem::from_sample(sample, image_size))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            samples,
            image_size,
            cached_items: Some(cached_items),
        })
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }
}

impl Dataset<LeafItem> for LeafDataset {
    fn get(&self, index: usize) -> Option<LeafItem> {
        if let Some(ref cached) = self.cached_items {
            return cached.get(index).cloned();
        }

        let sample = self.samples.get(index)?;
        match LeafItem::from_sample(sample, self.image_size) {
            Ok(item) => Some(item),
            Err(e) => {
                // Curation already decoded this file; it changed on disk since.
                warn!("Dropping sample from batch: {}", e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images and their class targets
#[derive(Clone, Debug)]
pub struct LeafBatch<B: Backend> {
    /// Shape `[batch_size, 3, size, size]`
    pub images: Tensor<B, 4>,
    /// Shape `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks [`LeafItem`]s into a [`LeafBatch`]
#[derive(Clone, Debug)]
pub struct LeafBatcher {
    image_size: usize,
}

impl LeafBatcher {
    pub fn new(image_size: u32) -> Self {
        Self {
            image_size: image_size as usize,
        }
    }
}

impl<B: Backend> Batcher<B, LeafItem, LeafBatch<B>> for LeafBatcher {
    fn batch(&self, items: Vec<LeafItem>, device: &B::Device) -> LeafBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, CHANNELS, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        LeafBatch { images, targets }
    }
}
