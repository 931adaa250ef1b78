//! Model-family image preprocessing.
//!
//! Both transforms resize so the shorter side covers the crop at 87.5%,
//! center-crop to the model input size and emit float32 HWC data. They differ
//! only in channel normalization.

use image::{imageops, imageops::FilterType, DynamicImage, RgbImage};
use mltools_core::{Error, ImageTensor, Preprocessor, Result};

/// Fraction (in percent) of the resized image kept by the center crop
const CROP_PERCENT: f32 = 87.5;

/// Per-channel RGB means subtracted by the VGG transform
const VGG_MEANS: [f32; 3] = [123.68, 116.78, 103.94];

/// Default input size when the engine does not expose an NHWC shape
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (224, 224);

/// Image preprocessor for one model family and input size
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    preprocessor: Preprocessor,
    height: u32,
    width: u32,
}

impl ImagePreprocessor {
    pub fn new(preprocessor: Preprocessor, height: u32, width: u32) -> Self {
        Self {
            preprocessor,
            height,
            width,
        }
    }

    /// Preprocessor for the default 224x224 input
    pub fn with_default_size(preprocessor: Preprocessor) -> Self {
        Self::new(preprocessor, DEFAULT_INPUT_SIZE.0, DEFAULT_INPUT_SIZE.1)
    }

    /// Output shape `[height, width, channels]`
    pub fn output_shape(&self) -> [usize; 3] {
        [self.height as usize, self.width as usize, 3]
    }

    /// Preprocesses a decoded image for model input
    pub fn preprocess(&self, image: &DynamicImage) -> Result<ImageTensor> {
        let rgb = image.to_rgb8();
        let resized = self.resize_with_aspect_ratio(&rgb)?;
        let cropped = self.center_crop(&resized)?;
        let data = self.normalize(&cropped);
        Ok(ImageTensor::from_f32(self.output_shape().to_vec(), data))
    }

    /// Scales the image so its shorter side matches the pre-crop size
    fn resize_with_aspect_ratio(&self, image: &RgbImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::Image("Cannot preprocess an empty image".to_string()));
        }

        let new_height = (100.0 * self.height as f32 / CROP_PERCENT) as u32;
        let new_width = (100.0 * self.width as f32 / CROP_PERCENT) as u32;

        let (w, h) = if height > width {
            (
                new_width,
                (new_height as f64 * height as f64 / width as f64) as u32,
            )
        } else {
            (
                (new_width as f64 * width as f64 / height as f64) as u32,
                new_height,
            )
        };

        Ok(imageops::resize(image, w, h, FilterType::Triangle))
    }

    fn center_crop(&self, image: &RgbImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        if width < self.width || height < self.height {
            return Err(Error::Image(format!(
                "Resized image {}x{} is smaller than the {}x{} crop",
                width, height, self.width, self.height
            )));
        }

        let left = (width - self.width) / 2;
        let top = (height - self.height) / 2;
        Ok(imageops::crop_imm(image, left, top, self.width, self.height).to_image())
    }

    /// Flattens to HWC float32 with the family's channel normalization
    fn normalize(&self, image: &RgbImage) -> Vec<f32> {
        let mut data = Vec::with_capacity(image.as_raw().len());
        for pixel in image.pixels() {
            for (channel, &value) in pixel.0.iter().enumerate() {
                let value = value as f32;
                let normalized = match self.preprocessor {
                    Preprocessor::Vgg => value - VGG_MEANS[channel],
                    Preprocessor::MobileNet => (value / 255.0 - 0.5) * 2.0,
                };
                data.push(normalized);
            }
        }
        data
    }
}
