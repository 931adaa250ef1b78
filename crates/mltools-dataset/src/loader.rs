//! Map file parsing and image loading for dataset splits.
//!
//! A map file lists one sample per line as `<relative-file-path> <label-id>`,
//! whitespace separated, with no header.

use image::DynamicImage;
use mltools_core::{Error, ImageSample, ImageTensor, Label, Result};
use ndarray::ArrayD;
use ndarray_npy::ReadNpyExt;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Image loader rooted at a dataset split directory
#[derive(Debug, Clone)]
pub struct ImageLoader {
    /// Directory the map file paths are relative to
    root_dir: PathBuf,
}

impl ImageLoader {
    /// Creates a new image loader
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Gets the full path for an image
    pub fn full_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    /// Decodes an image from a path
    ///
    /// A missing or undecodable file is a configuration error: the map file
    /// points at data that is not there.
    pub fn load_image(&self, path: &Path) -> Result<DynamicImage> {
        let full_path = self.full_path(path);

        if !full_path.exists() {
            return Err(Error::Config(format!(
                "Image file not found: {}",
                full_path.display()
            )));
        }

        image::open(&full_path).map_err(|e| {
            Error::Config(format!("Failed to load image {}: {e}", full_path.display()))
        })
    }

    /// Loads an already-preprocessed float32 array stored next to the image as `<file>.npy`
    pub fn load_npy(&self, path: &Path) -> Result<ImageTensor> {
        let mut npy_path = self.full_path(path).into_os_string();
        npy_path.push(".npy");
        let npy_path = PathBuf::from(npy_path);

        let file = File::open(&npy_path).map_err(|e| {
            Error::Config(format!("Array file {}: {e}", npy_path.display()))
        })?;
        let array = ArrayD::<f32>::read_npy(file).map_err(|e| {
            Error::Config(format!("Failed to read array {}: {e}", npy_path.display()))
        })?;

        let shape = array.shape().to_vec();
        let data = array.iter().copied().collect();
        Ok(ImageTensor::from_f32(shape, data))
    }

    /// Reads and parses the map file, joining every path with the root directory
    pub fn load_map_file(&self, map_file: &Path) -> Result<Vec<ImageSample>> {
        let map_path = self.full_path(map_file);
        let content = std::fs::read_to_string(&map_path).map_err(|e| {
            Error::Config(format!("Failed to read map file {}: {e}", map_path.display()))
        })?;

        Ok(parse_map_file(&content)?
            .into_iter()
            .map(|(path, label)| ImageSample::new(self.full_path(&path), label))
            .collect())
    }
}

/// Parses map file content into `(relative path, label)` pairs.
///
/// Blank lines are skipped; any other line must hold exactly a path and an
/// integer label.
pub fn parse_map_file(content: &str) -> Result<Vec<(PathBuf, Label)>> {
    let mut entries = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => continue,
            [path, label] => {
                let label = label.parse::<Label>().map_err(|e| {
                    Error::Config(format!(
                        "Map file line {}: invalid label '{label}': {e}",
                        line_no + 1
                    ))
                })?;
                entries.push((PathBuf::from(path), label));
            }
            _ => {
                return Err(Error::Config(format!(
                    "Map file line {}: expected '<path> <label>', got '{}'",
                    line_no + 1,
                    line.trim()
                )))
            }
        }
    }

    Ok(entries)
}

/// Reads a plain image list: one relative path per line, blank lines ignored
pub fn read_image_list(path: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read image list {}: {e}", path.display()))
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}
