//! Phase runner
//!
//! Runs one training phase (a fixed number of epochs at one learning rate and
//! one freezing setting) with a custom Burn loop: reshuffle, batch, forward,
//! cross-entropy, backward, Adam step, then evaluate on the validation set
//! with the non-autodiff model.

use std::time::Instant;

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dataset::burn_dataset::{LeafBatch, LeafBatcher, LeafDataset, LeafItem};
use crate::model::classifier::LeafClassifier;
use crate::utils::error::{CropCareError, Result};
use crate::utils::logging::TrainingLogger;

/// Which of the two training phases is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPhase {
    /// Whole backbone frozen, only the head learns
    HeadOnly,
    /// Later backbone blocks unfrozen at a low learning rate
    FineTune,
}

impl std::fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainingPhase::HeadOnly => write!(f, "head"),
            TrainingPhase::FineTune => write!(f, "fine-tune"),
        }
    }
}

/// Settings for one phase
#[derive(Debug, Clone)]
pub struct PhaseSettings {
    pub phase: TrainingPhase,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Leading backbone blocks kept frozen
    pub frozen_blocks: usize,
}

/// Metrics recorded at the end of one epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-indexed
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
    pub duration_secs: f64,
}

/// Summary of a finished phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: TrainingPhase,
    pub learning_rate: f64,
    pub frozen_blocks: usize,
    pub trainable_blocks: usize,
    pub epochs: Vec<EpochMetrics>,
    pub best_val_accuracy: f64,
    pub duration_secs: f64,
}

impl PhaseReport {
    /// Validation accuracy after the last epoch (0 when no epoch ran)
    pub fn final_val_accuracy(&self) -> f64 {
        self.epochs.last().map(|e| e.val_accuracy).unwrap_or(0.0)
    }
}

/// Runs training phases over a fixed train/validation pair.
///
/// The shuffle generator lives across phases, so two runs with the same seed
/// visit batches in the same order.
pub struct PhaseRunner<'a, B: AutodiffBackend> {
    train: &'a LeafDataset,
    validation: &'a LeafDataset,
    batcher: LeafBatcher,
    batch_size: usize,
    rng: ChaCha8Rng,
    device: B::Device,
}

impl<'a, B: AutodiffBackend> PhaseRunner<'a, B> {
    pub fn new(
        train: &'a LeafDataset,
        validation: &'a LeafDataset,
        batch_size: usize,
        seed: u64,
        device: B::Device,
    ) -> Self {
        Self {
            batcher: LeafBatcher::new(train.image_size()),
            train,
            validation,
            batch_size: batch_size.max(1),
            rng: ChaCha8Rng::seed_from_u64(seed),
            device,
        }
    }

    /// Train `model` for one phase and return it with the phase summary
    pub fn run(
        &mut self,
        model: LeafClassifier<B>,
        settings: &PhaseSettings,
    ) -> Result<(LeafClassifier<B>, PhaseReport)> {
        if self.train.is_empty() {
            return Err(CropCareError::Training("training set is empty".to_string()));
        }

        let mut model = model.with_frozen_blocks(settings.frozen_blocks);
        let trainable_blocks = model.trainable_blocks();
        let mut optimizer = AdamConfig::new().init::<B, LeafClassifier<B>>();
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);

        let phase_name = settings.phase.to_string();
        let mut logger = TrainingLogger::new(&phase_name, settings.epochs);
        let phase_start = Instant::now();
        let mut epochs = Vec::with_capacity(settings.epochs);
        let mut best_val_accuracy = 0.0f64;

        for epoch in 0..settings.epochs {
            logger.start_epoch(epoch);
            let epoch_start = Instant::now();

            let mut indices: Vec<usize> = (0..self.train.len()).collect();
            indices.shuffle(&mut self.rng);

            let mut epoch_loss = 0.0f64;
            let mut batches = 0usize;
            let mut correct = 0usize;
            let mut seen = 0usize;

            for chunk in indices.chunks(self.batch_size) {
                let items: Vec<LeafItem> = chunk.iter().filter_map(|&i| self.train.get(i)).collect();
                if items.is_empty() {
                    continue;
                }

                let batch: LeafBatch<B> = self.batcher.batch(items, &self.device);
                let batch_size = batch.targets.dims()[0];

                let output = model.forward(batch.images);
                let loss = loss_fn.forward(output.clone(), batch.targets.clone());

                let loss_value: f64 = loss.clone().into_scalar().elem();
                epoch_loss += loss_value;
                batches += 1;
                correct += count_correct(output, batch.targets);
                seen += batch_size;

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(settings.learning_rate, model, grads);

                debug!(
                    "[{}] batch {}: loss = {:.4}, running acc = {:.2}%",
                    phase_name,
                    batches,
                    loss_value,
                    100.0 * correct as f64 / seen as f64
                );
            }

            if batches == 0 {
                warn!("[{}] epoch {} had no readable training images", phase_name, epoch + 1);
            }

            let train_loss = epoch_loss / batches.max(1) as f64;
            let train_accuracy = correct as f64 / seen.max(1) as f64;
            let val_accuracy = self.evaluate(&model);
            best_val_accuracy = best_val_accuracy.max(val_accuracy);

            logger.end_epoch(train_loss, train_accuracy, val_accuracy, settings.learning_rate);
            epochs.push(EpochMetrics {
                epoch: epoch + 1,
                train_loss,
                train_accuracy,
                val_accuracy,
                duration_secs: epoch_start.elapsed().as_secs_f64(),
            });
        }

        logger.log_complete(best_val_accuracy);

        let report = PhaseReport {
            phase: settings.phase,
            learning_rate: settings.learning_rate,
            frozen_blocks: settings.frozen_blocks,
            trainable_blocks,
            epochs,
            best_val_accuracy,
            duration_secs: phase_start.elapsed().as_secs_f64(),
        };
        Ok((model, report))
    }

    /// Accuracy on the validation set; 0 when it is empty
    pub fn evaluate(&self, model: &LeafClassifier<B>) -> f64 {
        evaluate(&model.valid(), self.validation, &self.batcher, self.batch_size, &self.device)
    }
}

/// Accuracy of `model` over `dataset`, in [0, 1]
pub fn evaluate<B: Backend>(
    model: &LeafClassifier<B>,
    dataset: &LeafDataset,
    batcher: &LeafBatcher,
    batch_size: usize,
    device: &B::Device,
) -> f64 {
    let len = dataset.len();
    let mut correct = 0usize;
    let mut total = 0usize;

    for start in (0..len).step_by(batch_size.max(1)) {
        let end = (start + batch_size).min(len);
        let items: Vec<LeafItem> = (start..end).filter_map(|i| dataset.get(i)).collect();
        if items.is_empty() {
            continue;
        }

        let batch: LeafBatch<B> = batcher.batch(items, device);
        total += batch.targets.dims()[0];
        let output = model.forward(batch.images);
        correct += count_correct(output, batch.targets);
    }

    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

fn count_correct<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = output.dims();
    let predictions = output.argmax(1).reshape([batch_size]);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::curator::LabeledSample;
    use crate::dataset::test_support::write_png;
    use crate::model::classifier::LeafClassifierConfig;
    use burn::backend::Autodiff;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn samples(dir: &TempDir, n: usize) -> Vec<LabeledSample> {
        (0..n)
            .map(|i| {
                let class_index = i % 2;
                let color = if class_index == 0 { [220, 30, 30] } else { [30, 30, 220] };
                let path = dir.path().join(format!("{}.png", i));
                write_png(&path, 16, color);
                LabeledSample { path, class_index }
            })
            .collect()
    }

    fn tiny_model(device: &NdArrayDevice) -> LeafClassifier<TestBackend> {
        LeafClassifierConfig::new(2)
            .with_backbone_depth(2)
            .with_base_filters(4)
            .with_hidden_units(8)
            .init(device)
    }

    #[test]
    fn test_phase_records_every_epoch() {
        let dir = TempDir::new().unwrap();
        let data = samples(&dir, 6);
        let train = LeafDataset::new(data[..4].to_vec(), 16);
        let validation = LeafDataset::new(data[4..].to_vec(), 16);
        let device = NdArrayDevice::default();

        let model = tiny_model(&device);
        let mut runner = PhaseRunner::<TestBackend>::new(&train, &validation, 2, 42, device);
        let settings = PhaseSettings {
            phase: TrainingPhase::HeadOnly,
            epochs: 2,
            learning_rate: 1e-3,
            frozen_blocks: 2,
        };
        let (model, report) = runner.run(model, &settings).unwrap();

        assert_eq!(report.epochs.len(), 2);
        assert_eq!(report.trainable_blocks, 0);
        assert_eq!(model.trainable_blocks(), 0);
        for epoch in &report.epochs {
            assert!(epoch.train_loss.is_finite());
            assert!((0.0..=1.0).contains(&epoch.val_accuracy));
        }
    }

    fn backbone_state(model: &LeafClassifier<TestBackend>) -> Vec<Vec<f32>> {
        let mut state = Vec::new();
        for block in &model.backbone.blocks {
            state.push(block.conv.weight.val().into_data().to_vec().unwrap());
            state.push(block.bn.gamma.val().into_data().to_vec().unwrap());
            state.push(block.bn.beta.val().into_data().to_vec().unwrap());
            state.push(block.bn.running_mean.value().into_data().to_vec().unwrap());
            state.push(block.bn.running_var.value().into_data().to_vec().unwrap());
        }
        state
    }

    #[test]
    fn test_head_phase_leaves_backbone_state_unchanged() {
        let dir = TempDir::new().unwrap();
        let data = samples(&dir, 6);
        let train = LeafDataset::new(data[..4].to_vec(), 16);
        let validation = LeafDataset::new(data[4..].to_vec(), 16);
        let device = NdArrayDevice::default();

        let model = tiny_model(&device);
        let before = backbone_state(&model);
        let head_before: Vec<f32> = model.head.output.weight.val().into_data().to_vec().unwrap();

        let mut runner = PhaseRunner::<TestBackend>::new(&train, &validation, 2, 7, device);
        let settings = PhaseSettings {
            phase: TrainingPhase::HeadOnly,
            epochs: 1,
            learning_rate: 1e-2,
            frozen_blocks: 2,
        };
        let (model, _) = runner.run(model, &settings).unwrap();

        assert_eq!(backbone_state(&model), before);
        let head_after: Vec<f32> = model.head.output.weight.val().into_data().to_vec().unwrap();
        assert_ne!(head_after, head_before);
    }

    #[test]
    fn test_empty_validation_reports_zero() {
        let dir = TempDir::new().unwrap();
        let train = LeafDataset::new(samples(&dir, 3), 16);
        let validation = LeafDataset::new(Vec::new(), 16);
        let device = NdArrayDevice::default();

        let model = tiny_model(&device);
        let mut runner = PhaseRunner::<TestBackend>::new(&train, &validation, 4, 1, device);
        let settings = PhaseSettings {
            phase: TrainingPhase::FineTune,
            epochs: 1,
            learning_rate: 1e-5,
            frozen_blocks: 1,
        };
        let (_, report) = runner.run(model, &settings).unwrap();
        assert_eq!(report.final_val_accuracy(), 0.0);
        assert_eq!(report.trainable_blocks, 1);
    }

    #[test]
    fn test_empty_training_set_is_an_error() {
        let train = LeafDataset::new(Vec::new(), 16);
        let validation = LeafDataset::new(Vec::new(), 16);
        let device = NdArrayDevice::default();

        let model = tiny_model(&device);
        let mut runner = PhaseRunner::<TestBackend>::new(&train, &validation, 4, 1, device);
        let settings = PhaseSettings {
            phase: TrainingPhase::HeadOnly,
            epochs: 1,
            learning_rate: 1e-3,
            frozen_blocks: 2,
        };
        assert!(runner.run(model, &settings).is_err());
    }

    #[test]
    fn test_zero_epochs_leaves_model_untouched() {
        let dir = TempDir::new().unwrap();
        let train = LeafDataset::new(samples(&dir, 2), 16);
        let validation = LeafDataset::new(Vec::new(), 16);
        let device = NdArrayDevice::default();

        let model = tiny_model(&device);
        let mut runner = PhaseRunner::<TestBackend>::new(&train, &validation, 4, 1, device);
        let settings = PhaseSettings {
            phase: TrainingPhase::FineTune,
            epochs: 0,
            learning_rate: 1e-5,
            frozen_blocks: 1,
        };
        let (_, report) = runner.run(model, &settings).unwrap();
        assert!(report.epochs.is_empty());
        assert_eq!(report.best_val_accuracy, 0.0);
    }
}
