//! Dataset loading and input preparation for image classifier evaluation.
//!
//! This crate reads label map files, decodes and preprocesses images for a
//! model family, quantizes them for integer models and serves them batch by
//! batch.

pub mod dataset;
pub mod image_list;
pub mod loader;
pub mod preprocess;
pub mod quantize;

pub use dataset::{DatasetBatchSource, DatasetSplit, ImageSource, InputPipeline};
pub use image_list::CalibrationImages;
pub use loader::ImageLoader;
pub use preprocess::ImagePreprocessor;
pub use quantize::{maybe_quantize, quantize_value};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dataset::*;
    pub use crate::image_list::*;
    pub use crate::loader::*;
    pub use crate::preprocess::*;
    pub use crate::quantize::*;
}
