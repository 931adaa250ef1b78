//! TFLite models through tract.
//!
//! tract runs on the CPU only; there is no Edge TPU delegate.

use mltools_core::{
    Accelerator, ElementType, Error, ImageTensor, Prediction, QuantParams, Result, TensorData,
    TensorDetails,
};
use tract_core::prelude::*;
use tract_tflite::Tflite;
use tracing::debug;

use crate::engine::{EngineLoader, InferenceEngine};

fn invalid_model(e: TractError) -> Error {
    Error::InvalidModel(format!("{e:#}"))
}

fn inference_error(e: TractError) -> Error {
    Error::Inference(format!("{e:#}"))
}

fn details_from_fact(fact: &TypedFact) -> Result<TensorDetails> {
    let shape = fact
        .shape
        .as_concrete()
        .map(|dims| dims.to_vec())
        .ok_or_else(|| Error::InvalidModel(format!("Symbolic tensor shape {:?}", fact.shape)))?;

    let dt = fact.datum_type;
    let dtype = match dt.unquantized() {
        DatumType::F32 => ElementType::F32,
        DatumType::I8 => ElementType::I8,
        DatumType::U8 => ElementType::U8,
        _ => ElementType::Other,
    };
    let quantization = dt.is_quantized().then(|| {
        let (zero_point, scale) = dt.zp_scale();
        QuantParams::new(scale, zero_point)
    });

    Ok(TensorDetails {
        shape,
        dtype,
        quantization,
    })
}

/// One optimized, runnable copy of a TFLite model
pub struct TfliteEngine {
    plan: TypedRunnableModel<TypedModel>,
    input_dt: DatumType,
    input: TensorDetails,
    output: TensorDetails,
}

impl TfliteEngine {
    fn input_tensor(&self, image: &ImageTensor) -> Result<Tensor> {
        let shape = &self.input.shape;
        if image.len() != self.input.num_elements() {
            return Err(Error::Inference(format!(
                "Image has {} elements, model input {:?} needs {}",
                image.len(),
                shape,
                self.input.num_elements()
            )));
        }

        let tensor = match &image.data {
            TensorData::F32(values) => Tensor::from_shape(shape, values),
            TensorData::I8(values) => Tensor::from_shape(shape, values),
            TensorData::U8(values) => Tensor::from_shape(shape, values),
        }
        .map_err(inference_error)?;

        // Already-quantized values only need the model's zero point and scale attached.
        if self.input_dt.is_quantized() && tensor.datum_type() == self.input_dt.unquantized() {
            let (zp, scale) = self.input_dt.zp_scale();
            let desired = tensor.datum_type().with_zp_scale(zp, scale);
            return Ok(tensor
                .cast_to_dt(desired)
                .map_err(inference_error)?
                .into_owned());
        }
        Ok(tensor)
    }
}

impl InferenceEngine for TfliteEngine {
    fn input_details(&self) -> &TensorDetails {
        &self.input
    }

    fn output_details(&self) -> &TensorDetails {
        &self.output
    }

    fn infer(&mut self, input: &ImageTensor) -> Result<Prediction> {
        let tensor = self.input_tensor(input)?;
        let outputs = self.plan.run(tvec!(tensor.into())).map_err(inference_error)?;
        let output = outputs
            .first()
            .ok_or_else(|| Error::Inference("Model produced no outputs".to_string()))?;

        let scores = output.cast_to::<f32>().map_err(inference_error)?;
        Ok(scores.as_slice::<f32>().map_err(inference_error)?.to_vec())
    }
}

/// Loads `.tflite` flatbuffers
#[derive(Default)]
pub struct TfliteLoader {
    tflite: Tflite,
}

impl TfliteLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EngineLoader for TfliteLoader {
    type Engine = TfliteEngine;

    fn load(&self, model: &[u8], accelerator: Accelerator) -> Result<TfliteEngine> {
        if accelerator != Accelerator::Cpu {
            return Err(Error::HardwareUnavailable(format!(
                "tract has no {accelerator} delegate"
            )));
        }

        let mut reader = model;
        let typed = self.tflite.model_for_read(&mut reader).map_err(invalid_model)?;

        let input_fact = typed.input_fact(0).map_err(invalid_model)?;
        let input_dt = input_fact.datum_type;
        let input = details_from_fact(input_fact)?;
        let output = details_from_fact(typed.output_fact(0).map_err(invalid_model)?)?;
        debug!(?input, ?output, nodes = typed.nodes().len(), "Translated TFLite model");

        let plan = typed
            .into_optimized()
            .and_then(|optimized| optimized.into_runnable())
            .map_err(invalid_model)?;

        Ok(TfliteEngine {
            plan,
            input_dt,
            input,
            output,
        })
    }
}
