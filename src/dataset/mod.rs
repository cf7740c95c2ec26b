//! Dataset module
//!
//! - `catalog`: the ordered class-name list shared by training and inference
//! - `curator`: directory walk + decode validation producing labelled samples
//! - `split`: seeded train/validation partition
//! - `preprocess`: the single preprocessing path used for training and serving
//! - `burn_dataset`: Burn `Dataset`/`Batcher` glue

pub mod burn_dataset;
pub mod catalog;
pub mod curator;
pub mod preprocess;
pub mod split;

pub use burn_dataset::{LeafBatch, LeafBatcher, LeafDataset, LeafItem};
pub use catalog::ClassCatalog;
pub use curator::{curate, locate_train_dir, CurationReport, LabeledSample};
pub use preprocess::{preprocess, prepare_rgb, to_batch_tensor};
pub use split::{split_samples, SplitStats, TrainValSplit};

/// Class names use `Plant___Condition`, e.g. `Tomato___Late_blight`
pub const CLASS_SEPARATOR: &str = "___";

/// Plant part of a class name (`"Tomato"` from `"Tomato___Late_blight"`)
pub fn plant_name(class_name: &str) -> &str {
    class_name.split(CLASS_SEPARATOR).next().unwrap_or(class_name)
}

/// Whether a class represents a healthy leaf
pub fn is_healthy_class(class_name: &str) -> bool {
    class_name.to_lowercase().contains("healthy")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plant_name() {
        assert_eq!(plant_name("Tomato___Bacterial_spot"), "Tomato");
        assert_eq!(plant_name("Background_without_leaves"), "Background_without_leaves");
    }

    #[test]
    fn test_is_healthy_class() {
        assert!(is_healthy_class("Apple___healthy"));
        assert!(!is_healthy_class("Apple___Apple_scab"));
    }
}
