//! Core type definitions shared by the dataset, engine and evaluation crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ground-truth or predicted class label.
///
/// Signed so that a negative label offset stays representable.
pub type Label = i64;

/// Raw engine output for one image: a score per class.
pub type Prediction = Vec<f32>;

/// Represents an image sample with its ground-truth label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file, already joined with the split directory
    pub path: PathBuf,
    /// Raw label as written in the map file (no offset applied)
    pub label: Label,
}

impl ImageSample {
    /// Creates a new image sample
    pub fn new(path: impl Into<PathBuf>, label: Label) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }
}

/// Element type of an engine input or output tensor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ElementType {
    F32,
    I8,
    U8,
    /// Any type the harness does not feed directly (i32, f16, ...)
    Other,
}

impl ElementType {
    /// Whether images are affine-quantized before being fed to this type
    pub fn is_quantizable(&self) -> bool {
        matches!(self, ElementType::I8 | ElementType::U8)
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementType::F32 => write!(f, "float32"),
            ElementType::I8 => write!(f, "int8"),
            ElementType::U8 => write!(f, "uint8"),
            ElementType::Other => write!(f, "other"),
        }
    }
}

/// Affine quantization parameters: `real = (q - zero_point) * scale`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParams {
    pub fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }
}

/// Shape, element type and quantization of an engine tensor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TensorDetails {
    pub shape: Vec<usize>,
    pub dtype: ElementType,
    /// Present only for quantized tensors
    pub quantization: Option<QuantParams>,
}

impl TensorDetails {
    /// Float tensor without quantization
    pub fn float(shape: Vec<usize>) -> Self {
        Self {
            shape,
            dtype: ElementType::F32,
            quantization: None,
        }
    }

    /// Quantized tensor
    pub fn quantized(shape: Vec<usize>, dtype: ElementType, params: QuantParams) -> Self {
        Self {
            shape,
            dtype,
            quantization: Some(params),
        }
    }

    /// Number of elements in one tensor of this shape
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Spatial size `(height, width)` for NHWC image inputs
    pub fn image_size(&self) -> Option<(u32, u32)> {
        match self.shape.as_slice() {
            [_, h, w, _] => Some((*h as u32, *w as u32)),
            _ => None,
        }
    }
}

/// Typed storage for an image tensor
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I8(Vec<i8>),
    U8(Vec<u8>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::I8(v) => v.len(),
            TensorData::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            TensorData::F32(_) => ElementType::F32,
            TensorData::I8(_) => ElementType::I8,
            TensorData::U8(_) => ElementType::U8,
        }
    }
}

/// A preprocessed (and possibly quantized) image ready to feed an engine
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    /// Shape of the data, HWC for decoded images
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl ImageTensor {
    pub fn new(shape: Vec<usize>, data: TensorData) -> Self {
        Self { shape, data }
    }

    /// Float tensor
    pub fn from_f32(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self::new(shape, TensorData::F32(data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Model-family preprocessing transform
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Preprocessor {
    /// Mean-subtracted RGB in [0, 255]
    Vgg,
    /// RGB scaled to [-1, 1]
    #[value(name = "mobilenet")]
    #[serde(rename = "mobilenet")]
    MobileNet,
}

impl std::fmt::Display for Preprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preprocessor::Vgg => write!(f, "vgg"),
            Preprocessor::MobileNet => write!(f, "mobilenet"),
        }
    }
}

impl std::str::FromStr for Preprocessor {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vgg" => Ok(Preprocessor::Vgg),
            "mobilenet" => Ok(Preprocessor::MobileNet),
            other => Err(crate::Error::Config(format!(
                "Unknown preprocessor '{other}', expected one of: vgg, mobilenet"
            ))),
        }
    }
}

/// Hardware the engines are bound to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Accelerator {
    /// Plain CPU inference
    #[default]
    Cpu,
    /// Edge TPU delegate shared by every engine in the pool
    EdgeTpu,
}

impl std::fmt::Display for Accelerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Accelerator::Cpu => write!(f, "cpu"),
            Accelerator::EdgeTpu => write!(f, "edgetpu"),
        }
    }
}
