//! In-process mock engines for exercising pools, dispatch and the harness
//! without a model runtime.

use std::sync::Arc;

use mltools_core::{Accelerator, Error, ImageTensor, Prediction, Result, TensorData, TensorDetails};

use crate::engine::{EngineLoader, InferenceEngine};

type InferFn = dyn Fn(&ImageTensor) -> Result<Prediction> + Send + Sync;

/// Engine whose output is computed by a closure
#[derive(Clone)]
pub struct MockEngine {
    input: TensorDetails,
    output: TensorDetails,
    infer_fn: Arc<InferFn>,
    invocations: usize,
}

impl MockEngine {
    /// Float output of shape `[1, num_classes]`
    pub fn new<F>(input: TensorDetails, num_classes: usize, infer_fn: F) -> Self
    where
        F: Fn(&ImageTensor) -> Result<Prediction> + Send + Sync + 'static,
    {
        Self::with_shared_fn(input, num_classes, Arc::new(infer_fn))
    }

    fn with_shared_fn(input: TensorDetails, num_classes: usize, infer_fn: Arc<InferFn>) -> Self {
        Self {
            input,
            output: TensorDetails::float(vec![1, num_classes]),
            infer_fn,
            invocations: 0,
        }
    }

    /// Number of `infer` calls served by this instance
    pub fn invocations(&self) -> usize {
        self.invocations
    }
}

impl InferenceEngine for MockEngine {
    fn input_details(&self) -> &TensorDetails {
        &self.input
    }

    fn output_details(&self) -> &TensorDetails {
        &self.output
    }

    fn infer(&mut self, input: &ImageTensor) -> Result<Prediction> {
        self.invocations += 1;
        (self.infer_fn)(input)
    }
}

/// Loader producing [`MockEngine`]s that share one closure
pub struct MockLoader {
    input: TensorDetails,
    num_classes: usize,
    infer_fn: Arc<InferFn>,
    accelerator_available: bool,
}

impl MockLoader {
    pub fn new<F>(input: TensorDetails, num_classes: usize, infer_fn: F) -> Self
    where
        F: Fn(&ImageTensor) -> Result<Prediction> + Send + Sync + 'static,
    {
        Self {
            input,
            num_classes,
            infer_fn: Arc::new(infer_fn),
            accelerator_available: false,
        }
    }

    /// Whether loads requesting an accelerator succeed
    pub fn with_accelerator_available(mut self, available: bool) -> Self {
        self.accelerator_available = available;
        self
    }
}

impl EngineLoader for MockLoader {
    type Engine = MockEngine;

    fn load(&self, model: &[u8], accelerator: Accelerator) -> Result<MockEngine> {
        if model.is_empty() {
            return Err(Error::InvalidModel("empty model".to_string()));
        }
        if accelerator != Accelerator::Cpu && !self.accelerator_available {
            return Err(Error::HardwareUnavailable(format!(
                "{accelerator} delegate not present"
            )));
        }
        Ok(MockEngine::with_shared_fn(
            self.input.clone(),
            self.num_classes,
            Arc::clone(&self.infer_fn),
        ))
    }
}

/// Scores with 1.0 at `class` and 0.0 elsewhere
pub fn one_hot(class: usize, num_classes: usize) -> Prediction {
    let mut scores = vec![0.0; num_classes];
    if let Some(score) = scores.get_mut(class) {
        *score = 1.0;
    }
    scores
}

/// First element of an image tensor as a float
pub fn first_value(image: &ImageTensor) -> Result<f32> {
    let value = match &image.data {
        TensorData::F32(v) => v.first().copied(),
        TensorData::I8(v) => v.first().map(|&x| x as f32),
        TensorData::U8(v) => v.first().map(|&x| x as f32),
    };
    value.ok_or_else(|| Error::Inference("empty input tensor".to_string()))
}
