//! Leaf classifier: convolutional backbone + dense head
//!
//! The backbone is a stack of conv blocks ending in global average pooling.
//! Training happens in two phases: first only the head learns (the whole
//! backbone is frozen), then the later backbone blocks are unfrozen for
//! fine-tuning at a lower learning rate.
//!
//! Frozen blocks run in inference mode: batch norm normalises with its
//! running statistics and never updates them. The activation after the last
//! frozen block is detached, so the autodiff graph never reaches frozen
//! weights and the optimizer sees no gradient for them.

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};
use tracing::info;

use crate::utils::error::CropCareError;

/// Architecture of the leaf classifier
#[derive(Config, Debug)]
pub struct LeafClassifierConfig {
    /// Number of output classes (length of the class catalog)
    pub num_classes: usize,

    /// Number of conv blocks; each halves the spatial resolution
    #[config(default = "5")]
    pub backbone_depth: usize,

    /// Filters in the first block
    #[config(default = "32")]
    pub base_filters: usize,

    /// Width of the hidden dense layer
    #[config(default = "256")]
    pub hidden_units: usize,

    /// Dropout rate, applied before and after the hidden layer
    #[config(default = "0.3")]
    pub dropout: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,
}

impl LeafClassifierConfig {
    /// Output channels of backbone block `index`
    pub fn block_filters(&self, index: usize) -> usize {
        self.base_filters * (1 << index.min(3))
    }

    /// Channels produced by the backbone after pooling
    pub fn feature_dim(&self) -> usize {
        self.block_filters(self.backbone_depth.saturating_sub(1))
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> LeafClassifier<B> {
        let mut blocks = Vec::with_capacity(self.backbone_depth);
        let mut in_channels = self.in_channels;
        for i in 0..self.backbone_depth {
            let out_channels = self.block_filters(i);
            blocks.push(ConvBlock::new(in_channels, out_channels, 3, device));
            in_channels = out_channels;
        }

        let backbone = Backbone {
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            frozen_blocks: 0,
        };

        let head = ClassifierHead {
            dropout_in: DropoutConfig::new(self.dropout).init(),
            hidden: LinearConfig::new(self.feature_dim(), self.hidden_units).init(device),
            relu: Relu::new(),
            dropout_out: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
        };

        LeafClassifier {
            backbone,
            head,
            num_classes: self.num_classes,
        }
    }
}

/// Conv2d 3x3 -> BatchNorm -> ReLU -> MaxPool 2x2
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }

    /// Same as `forward` but with batch norm in inference mode, whatever the
    /// backend; the running statistics are left as they are
    pub fn forward_frozen(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = normalize_with_running_stats(&self.bn, x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

fn normalize_with_running_stats<B: Backend>(bn: &BatchNorm<B, 2>, x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, channels, _, _] = x.dims();
    let shape = [1, channels, 1, 1];

    let mean = bn.running_mean.value().reshape(shape);
    let var = bn.running_var.value().reshape(shape);
    let gamma = bn.gamma.val().reshape(shape);
    let beta = bn.beta.val().reshape(shape);

    x.sub(mean)
        .div(var.add_scalar(bn.epsilon).sqrt())
        .mul(gamma)
        .add(beta)
}

/// Feature extractor shared by both training phases
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub pool: AdaptiveAvgPool2d,
    /// Leading blocks that receive no gradient and keep their batch statistics
    frozen_blocks: usize,
}

impl<B: Backend> Backbone<B> {
    /// `[batch, 3, H, W]` -> `[batch, features]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for (i, block) in self.blocks.iter().enumerate() {
            if i < self.frozen_blocks {
                x = block.forward_frozen(x);
            } else {
                x = block.forward(x);
            }
            if i + 1 == self.frozen_blocks {
                x = x.detach();
            }
        }

        let x = self.pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    pub fn frozen_blocks(&self) -> usize {
        self.frozen_blocks
    }
}

/// Dropout -> Dense(hidden, ReLU) -> Dropout -> Dense(num_classes)
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub dropout_in: Dropout,
    pub hidden: Linear<B>,
    pub relu: Relu,
    pub dropout_out: Dropout,
    pub output: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout_in.forward(features);
        let x = self.relu.forward(self.hidden.forward(x));
        let x = self.dropout_out.forward(x);
        self.output.forward(x)
    }
}

/// Plant leaf disease classifier
#[derive(Module, Debug)]
pub struct LeafClassifier<B: Backend> {
    pub backbone: Backbone<B>,
    pub head: ClassifierHead<B>,
    num_classes: usize,
}

impl<B: Backend> LeafClassifier<B> {
    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.backbone.forward(x))
    }

    /// Class probabilities, each row sums to 1
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Freeze every backbone block; only the head trains
    pub fn freeze_backbone(self) -> Self {
        let depth = self.backbone.depth();
        self.with_frozen_blocks(depth)
    }

    /// Freeze the first `n` backbone blocks (clamped to the depth)
    pub fn with_frozen_blocks(mut self, n: usize) -> Self {
        self.backbone.frozen_blocks = n.min(self.backbone.depth());
        self
    }

    /// Backbone blocks that currently receive gradients
    pub fn trainable_blocks(&self) -> usize {
        self.backbone.depth() - self.backbone.frozen_blocks
    }

    /// Replace the backbone with a pretrained record saved by `CompactRecorder`.
    ///
    /// The record must come from a backbone with the same depth and filters.
    pub fn load_backbone_weights(
        mut self,
        path: &Path,
        device: &B::Device,
    ) -> crate::utils::error::Result<Self> {
        if !path.with_extension("mpk").exists() && !path.exists() {
            return Err(CropCareError::Configuration(format!(
                "Backbone weights not found: {:?}",
                path
            )));
        }

        let frozen = self.backbone.frozen_blocks;
        self.backbone = self
            .backbone
            .load_file(path, &CompactRecorder::new(), device)
            .map_err(|e| CropCareError::Model(format!("Failed to load backbone weights: {:?}", e)))?;
        self.backbone.frozen_blocks = frozen;

        info!("Loaded pretrained backbone from {:?}", path);
        Ok(self)
    }
}
