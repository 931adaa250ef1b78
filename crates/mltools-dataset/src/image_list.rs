//! Lazy single-image input stream used for calibration.

use std::path::{Path, PathBuf};

use mltools_core::{ImageTensor, Result};
use tracing::info;

use crate::loader::{read_image_list, ImageLoader};
use crate::preprocess::ImagePreprocessor;

/// Pull-based iterator over calibration inputs.
///
/// Each item is one preprocessed image shaped `[1, height, width, channels]`;
/// nothing is decoded before it is requested.
pub struct CalibrationImages {
    loader: ImageLoader,
    preprocessor: ImagePreprocessor,
    paths: Vec<PathBuf>,
    next: usize,
}

impl CalibrationImages {
    pub fn new(loader: ImageLoader, preprocessor: ImagePreprocessor, paths: Vec<PathBuf>) -> Self {
        Self {
            loader,
            preprocessor,
            paths,
            next: 0,
        }
    }

    /// Reads the image list file; listed paths are relative to `dataset_dir`
    pub fn from_list_file(
        list_path: &Path,
        dataset_dir: impl Into<PathBuf>,
        preprocessor: ImagePreprocessor,
    ) -> Result<Self> {
        let paths = read_image_list(list_path)?;
        Ok(Self::new(ImageLoader::new(dataset_dir), preprocessor, paths))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Iterator for CalibrationImages {
    type Item = Result<ImageTensor>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.get(self.next)?;
        info!(
            "Image {} of {}: {}",
            self.next,
            self.paths.len() - 1,
            path.display()
        );
        self.next += 1;

        let result = self
            .loader
            .load_image(path)
            .and_then(|image| self.preprocessor.preprocess(&image))
            .map(|mut tensor| {
                tensor.shape.insert(0, 1);
                tensor
            });
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.paths.len() - self.next;
        (remaining, Some(remaining))
    }
}
