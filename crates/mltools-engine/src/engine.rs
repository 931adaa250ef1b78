//! Capability traits for inference runtimes.

use mltools_core::{Accelerator, ImageTensor, Prediction, Result, TensorDetails};

/// A loaded, allocated model ready to run one inference at a time.
///
/// `infer` takes `&mut self`, so a handle can never be invoked by two tasks
/// at once.
pub trait InferenceEngine: Send {
    /// Shape, type and quantization of the (single) input tensor
    fn input_details(&self) -> &TensorDetails;

    /// Shape, type and quantization of the (single) output tensor
    fn output_details(&self) -> &TensorDetails;

    /// Runs the model on one image and returns the squeezed output scores
    fn infer(&mut self, input: &ImageTensor) -> Result<Prediction>;
}

/// Builds engines from a model artifact
pub trait EngineLoader {
    type Engine: InferenceEngine;

    /// Parses `model` and returns an engine bound to `accelerator`.
    ///
    /// Fails with `Error::InvalidModel` for an unparseable artifact and with
    /// `Error::HardwareUnavailable` when the accelerator cannot be used.
    fn load(&self, model: &[u8], accelerator: Accelerator) -> Result<Self::Engine>;
}
