//! Error Handling Module
//!
//! Defines the error type shared by curation, training and inference.
//! Uses thiserror for ergonomic error definitions.
//!
//! Per-file decode failures during curation are *not* errors: they are
//! counted in [`crate::dataset::CurationReport`] and never surface here.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for cropcare operations
#[derive(Error, Debug)]
pub enum CropCareError {
    /// Bad or missing input directory structure, or invalid settings.
    /// Fatal and never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The trained artifact is not on disk yet
    #[error("Model not ready: no trained artifact at '{0}' (run `cropcare train` first)")]
    ModelNotReady(PathBuf),

    /// Error loading or processing an image
    #[error("Failed to load image at '{0}': {1}")]
    Image(PathBuf, String),

    /// Error with model construction or weights
    #[error("Model error: {0}")]
    Model(String),

    /// Error during training
    #[error("Training error: {0}")]
    Training(String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Error from the burn recorder while saving or loading weights
    #[error("Recorder error: {0}")]
    Recorder(String),

    /// Error talking to the chat completion API
    #[error("Chat error: {0}")]
    Chat(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CropCareError {
    /// True when the caller should answer "not trained yet" rather than
    /// reporting an internal fault.
    pub fn is_model_not_ready(&self) -> bool {
        matches!(self, CropCareError::ModelNotReady(_))
    }

    /// True for fatal configuration problems.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CropCareError::Configuration(_))
    }
}

impl From<serde_json::Error> for CropCareError {
    fn from(err: serde_json::Error) -> Self {
        CropCareError::Serialization(err.to_string())
    }
}

/// Decoding failures without a file path (uploads) are bad input
impl From<image::ImageError> for CropCareError {
    fn from(err: image::ImageError) -> Self {
        CropCareError::InvalidInput(err.to_string())
    }
}

impl From<burn::record::RecorderError> for CropCareError {
    fn from(err: burn::record::RecorderError) -> Self {
        CropCareError::Recorder(format!("{:?}", err))
    }
}

/// Convenience Result type for cropcare operations
pub type Result<T> = std::result::Result<T, CropCareError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CropCareError::Configuration("no train directory".to_string());
        assert_eq!(format!("{}", err), "Configuration error: no train directory");
    }

    #[test]
    fn test_model_not_ready_is_distinguishable() {
        let err = CropCareError::ModelNotReady(PathBuf::from("models/leaf_model.mpk"));
        assert!(err.is_model_not_ready());
        assert!(!err.is_configuration());
        assert!(format!("{}", err).contains("leaf_model.mpk"));

        let other = CropCareError::Inference("boom".to_string());
        assert!(!other.is_model_not_ready());
    }

    #[test]
    fn test_image_error() {
        let path = PathBuf::from("/path/to/leaf.jpg");
        let err = CropCareError::Image(path, "truncated".to_string());
        assert!(format!("{}", err).contains("leaf.jpg"));
    }

    #[test]
    fn test_image_error_conversion() {
        let decode = image::load_from_memory(b"definitely not an image");
        let err: CropCareError = decode.unwrap_err().into();
        assert!(matches!(err, CropCareError::InvalidInput(_)));
    }

    #[test]
    fn test_serde_conversion() {
        let parse: std::result::Result<Vec<String>, _> = serde_json::from_str("not json");
        let err: CropCareError = parse.unwrap_err().into();
        assert!(matches!(err, CropCareError::Serialization(_)));
    }
}
