//! Backend selection
//!
//! CPU (NdArray) by default; the `cuda` feature switches both training and
//! inference to the CUDA backend.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type InferenceBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type InferenceBackend = burn_ndarray::NdArray;

/// The autodiff backend used for training
pub type TrainingBackend = Autodiff<InferenceBackend>;

/// Get the default device for the selected backend
pub fn default_device() -> <InferenceBackend as Backend>::Device {
    <InferenceBackend as Backend>::Device::default()
}

/// Human-readable name of the compiled backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}
