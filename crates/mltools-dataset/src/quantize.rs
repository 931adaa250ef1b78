//! Affine input quantization for integer models.
//!
//! `q = round(v / scale) + zero_point`, rounding half to even and saturating
//! to the target integer range.

use mltools_core::{ElementType, Error, ImageTensor, QuantParams, Result, TensorData, TensorDetails};

/// Quantizes one value into `[min, max]`
pub fn quantize_value(value: f32, params: QuantParams, min: i32, max: i32) -> i32 {
    let q = (value / params.scale).round_ties_even() + params.zero_point as f32;
    // `as` saturates on overflow and maps NaN to 0.
    (q as i32).clamp(min, max)
}

fn check_params(params: QuantParams) -> Result<()> {
    if !(params.scale.is_finite() && params.scale > 0.0) {
        return Err(Error::InvalidArgument(format!(
            "Quantization scale must be positive and finite, got {}",
            params.scale
        )));
    }
    Ok(())
}

/// Quantizes a float image for an i8 or u8 input tensor
pub fn quantize(
    image: &ImageTensor,
    dtype: ElementType,
    params: QuantParams,
) -> Result<ImageTensor> {
    check_params(params)?;

    let values = match &image.data {
        TensorData::F32(values) => values,
        other => {
            return Err(Error::InvalidArgument(format!(
                "Only float images can be quantized, got {}",
                other.element_type()
            )))
        }
    };

    let data = match dtype {
        ElementType::I8 => TensorData::I8(
            values
                .iter()
                .map(|&v| quantize_value(v, params, i8::MIN as i32, i8::MAX as i32) as i8)
                .collect(),
        ),
        ElementType::U8 => TensorData::U8(
            values
                .iter()
                .map(|&v| quantize_value(v, params, u8::MIN as i32, u8::MAX as i32) as u8)
                .collect(),
        ),
        other => {
            return Err(Error::InvalidArgument(format!(
                "Cannot quantize to {other}"
            )))
        }
    };

    Ok(ImageTensor::new(image.shape.clone(), data))
}

/// Quantizes `image` when enabled and the engine input is i8 or u8; otherwise
/// returns it unchanged.
pub fn maybe_quantize(
    image: ImageTensor,
    input: &TensorDetails,
    enabled: bool,
) -> Result<ImageTensor> {
    if !enabled || !input.dtype.is_quantizable() {
        return Ok(image);
    }

    let params = input.quantization.ok_or_else(|| {
        Error::InvalidModel(format!(
            "Input tensor is {} but carries no quantization parameters",
            input.dtype
        ))
    })?;

    quantize(&image, input.dtype, params)
}
