//! Deterministic train/validation split
//!
//! Sample indices are shuffled with a seeded ChaCha8 generator and the first
//! `floor(n * validation_fraction)` shuffled indices become the validation
//! set. The same samples and seed always give the same partition.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::curator::LabeledSample;
use crate::utils::error::{CropCareError, Result};

/// Result of splitting curated samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainValSplit {
    pub train: Vec<LabeledSample>,
    pub validation: Vec<LabeledSample>,
    /// Original sample indices assigned to training, in shuffled order
    pub train_indices: Vec<usize>,
    /// Original sample indices assigned to validation, in shuffled order
    pub validation_indices: Vec<usize>,
}

/// Per-class sizes of both sides of a split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitStats {
    pub train_size: usize,
    pub validation_size: usize,
    pub train_per_class: Vec<usize>,
    pub validation_per_class: Vec<usize>,
}

/// Split `samples` into training and validation sets.
pub fn split_samples(
    samples: &[LabeledSample],
    validation_fraction: f64,
    seed: u64,
) -> Result<TrainValSplit> {
    if !(0.0..1.0).contains(&validation_fraction) {
        return Err(CropCareError::Configuration(format!(
            "validation fraction must be in [0, 1), got {}",
            validation_fraction
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..samples.len()).collect();
    indices.shuffle(&mut rng);

    let n_val = (samples.len() as f64 * validation_fraction).floor() as usize;
    let (val_idx, train_idx) = indices.split_at(n_val);

    Ok(TrainValSplit {
        train: train_idx.iter().map(|&i| samples[i].clone()).collect(),
        validation: val_idx.iter().map(|&i| samples[i].clone()).collect(),
        train_indices: train_idx.to_vec(),
        validation_indices: val_idx.to_vec(),
    })
}

impl TrainValSplit {
    pub fn stats(&self, num_classes: usize) -> SplitStats {
        let count = |samples: &[LabeledSample]| {
            let mut counts = vec![0usize; num_classes];
            for sample in samples {
                if let Some(c) = counts.get_mut(sample.class_index) {
                    *c += 1;
                }
            }
            counts
        };

        SplitStats {
            train_size: self.train.len(),
            validation_size: self.validation.len(),
            train_per_class: count(&self.train),
            validation_per_class: count(&self.validation),
        }
    }
}
