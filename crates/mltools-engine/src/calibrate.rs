//! Calibration capability and the built-in range calibrator.

use mltools_core::{ElementType, Error, ImageTensor, QuantParams, Result, TensorData};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Produces a quantized artifact from a model and representative inputs.
///
/// `inputs` is pulled one image at a time; implementations must not collect
/// it eagerly.
pub trait Quantizer {
    fn calibrate_and_quantize(
        &mut self,
        model: &[u8],
        inputs: &mut dyn Iterator<Item = Result<ImageTensor>>,
    ) -> Result<Vec<u8>>;
}

/// Observed input range and the int8 parameters derived from it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationTable {
    /// SHA-256 of the source model artifact, hex encoded
    pub model_sha256: String,
    pub num_samples: usize,
    pub min: f32,
    pub max: f32,
    pub dtype: ElementType,
    pub params: QuantParams,
}

impl CalibrationTable {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Asymmetric int8 parameters covering `[min, max]`.
///
/// The range is widened to include 0 so that zero is exactly representable.
pub fn int8_params(min: f32, max: f32) -> QuantParams {
    let min = min.min(0.0);
    let max = max.max(0.0);
    let qmin = i8::MIN as f32;
    let qmax = i8::MAX as f32;

    let range = max - min;
    let scale = if range > 0.0 { range / (qmax - qmin) } else { 1.0 };
    let zero_point = (qmin - (min / scale).round()).clamp(qmin, qmax) as i32;
    QuantParams::new(scale, zero_point)
}

/// Min/max observer over the calibration stream
#[derive(Debug, Default)]
pub struct RangeCalibrator {
    last: Option<CalibrationTable>,
}

impl RangeCalibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table produced by the most recent successful run
    pub fn last_table(&self) -> Option<&CalibrationTable> {
        self.last.as_ref()
    }
}

impl Quantizer for RangeCalibrator {
    fn calibrate_and_quantize(
        &mut self,
        model: &[u8],
        inputs: &mut dyn Iterator<Item = Result<ImageTensor>>,
    ) -> Result<Vec<u8>> {
        if model.is_empty() {
            return Err(Error::InvalidModel("empty model".to_string()));
        }

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut num_samples = 0;

        for input in inputs {
            let image = input?;
            let values = match &image.data {
                TensorData::F32(values) => values,
                other => {
                    return Err(Error::InvalidArgument(format!(
                        "Calibration expects float inputs, got {}",
                        other.element_type()
                    )))
                }
            };

            for &v in values.iter().filter(|v| v.is_finite()) {
                min = min.min(v);
                max = max.max(v);
            }
            num_samples += 1;
            debug!(num_samples, min, max, "Observed calibration input");
        }

        if num_samples == 0 {
            return Err(Error::Dataset("No calibration images".to_string()));
        }
        if min > max {
            return Err(Error::Dataset(
                "Calibration inputs contain no finite values".to_string(),
            ));
        }

        let params = int8_params(min, max);
        info!(
            "Calibrated on {} images: range [{:.4}, {:.4}], scale {:.6}, zero point {}",
            num_samples, min, max, params.scale, params.zero_point
        );

        let table = CalibrationTable {
            model_sha256: format!("{:x}", Sha256::digest(model)),
            num_samples,
            min,
            max,
            dtype: ElementType::I8,
            params,
        };
        let bytes = table.to_json()?;
        self.last = Some(table);
        Ok(bytes)
    }
}
