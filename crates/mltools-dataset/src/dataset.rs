//! Dataset split partitioning and lazy batch reading.

use std::ops::Range;
use std::path::Path;

use mltools_core::{
    Error, ImageSample, ImageTensor, Label, Preprocessor, Result, TensorDetails,
};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::loader::ImageLoader;
use crate::preprocess::{ImagePreprocessor, DEFAULT_INPUT_SIZE};
use crate::quantize::maybe_quantize;

/// Ordered samples of a split, capped and partitioned into fixed-size batches
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    samples: Vec<ImageSample>,
    batch_size: usize,
}

impl DatasetSplit {
    /// Keeps the first `max_samples` samples (all when `None`)
    pub fn new(
        mut samples: Vec<ImageSample>,
        batch_size: usize,
        max_samples: Option<usize>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Config("Batch size must be greater than 0".to_string()));
        }
        if let Some(max) = max_samples {
            samples.truncate(max);
        }
        Ok(Self {
            samples,
            batch_size,
        })
    }

    /// Loads the split from a map file resolved against the loader's root
    pub fn from_map_file(
        loader: &ImageLoader,
        map_file: &Path,
        batch_size: usize,
        max_samples: Option<usize>,
    ) -> Result<Self> {
        let samples = loader.load_map_file(map_file)?;
        let split = Self::new(samples, batch_size, max_samples)?;
        info!(
            "Loaded {} samples from {} ({} batches of {})",
            split.num_samples(),
            loader.full_path(map_file).display(),
            split.num_batches(),
            split.batch_size()
        );
        Ok(split)
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// `ceil(num_samples / batch_size)`
    pub fn num_batches(&self) -> usize {
        self.num_samples().div_ceil(self.batch_size)
    }

    /// Sample index range of a batch
    pub fn batch_range(&self, batch_id: usize) -> Result<Range<usize>> {
        if batch_id >= self.num_batches() {
            return Err(Error::InvalidArgument(format!(
                "Batch {batch_id} out of range, split has {} batches",
                self.num_batches()
            )));
        }
        let start = batch_id * self.batch_size;
        let end = (start + self.batch_size).min(self.num_samples());
        Ok(start..end)
    }

    pub fn batch_samples(&self, batch_id: usize) -> Result<&[ImageSample]> {
        let range = self.batch_range(batch_id)?;
        Ok(&self.samples[range])
    }
}

/// Where model inputs come from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Decode the image file and apply the model-family transform
    Decode(ImagePreprocessor),
    /// Load a preprocessed float32 array from `<file>.npy`
    Numpy,
}

/// Turns a sample path into an engine-ready tensor
#[derive(Debug, Clone)]
pub struct InputPipeline {
    source: ImageSource,
    input: TensorDetails,
    quantize_input: bool,
}

impl InputPipeline {
    pub fn new(source: ImageSource, input: TensorDetails, quantize_input: bool) -> Self {
        Self {
            source,
            input,
            quantize_input,
        }
    }

    /// Pipeline sized from the engine's NHWC input shape
    pub fn for_model(
        preprocessor: Preprocessor,
        input: TensorDetails,
        quantize_input: bool,
        read_from_numpy: bool,
    ) -> Self {
        let source = if read_from_numpy {
            ImageSource::Numpy
        } else {
            let (height, width) = input.image_size().unwrap_or(DEFAULT_INPUT_SIZE);
            ImageSource::Decode(ImagePreprocessor::new(preprocessor, height, width))
        };
        Self::new(source, input, quantize_input)
    }

    pub fn input_details(&self) -> &TensorDetails {
        &self.input
    }

    /// Loads, preprocesses and (maybe) quantizes one image
    pub fn prepare(&self, loader: &ImageLoader, path: &Path) -> Result<ImageTensor> {
        let image = match &self.source {
            ImageSource::Decode(preprocessor) => {
                let decoded = loader.load_image(path)?;
                preprocessor.preprocess(&decoded)?
            }
            ImageSource::Numpy => loader.load_npy(path)?,
        };
        maybe_quantize(image, &self.input, self.quantize_input)
    }
}

/// Serves a dataset split batch by batch, reading images on demand
#[derive(Debug, Clone)]
pub struct DatasetBatchSource {
    split: DatasetSplit,
    loader: ImageLoader,
    pipeline: InputPipeline,
    label_offset: i64,
}

impl DatasetBatchSource {
    pub fn new(
        split: DatasetSplit,
        loader: ImageLoader,
        pipeline: InputPipeline,
        label_offset: i64,
    ) -> Self {
        Self {
            split,
            loader,
            pipeline,
            label_offset,
        }
    }

    pub fn num_samples(&self) -> usize {
        self.split.num_samples()
    }

    pub fn num_batches(&self) -> usize {
        self.split.num_batches()
    }

    pub fn batch_size(&self) -> usize {
        self.split.batch_size()
    }

    /// Ground-truth label with the configured offset applied
    pub fn adjusted_label(&self, sample: &ImageSample) -> Label {
        sample.label + self.label_offset
    }

    /// Reads one batch as `(image, adjusted_label)` pairs in sample order.
    ///
    /// Holds no state between calls, so batches can be read in any order and
    /// more than once. The first unreadable image fails the whole batch.
    pub fn read_batch(&self, batch_id: usize) -> Result<Vec<(ImageTensor, Label)>> {
        let samples = self.split.batch_samples(batch_id)?;
        debug!("Reading batch {} ({} images)", batch_id, samples.len());

        samples
            .par_iter()
            .map(|sample| {
                let image = self.pipeline.prepare(&self.loader, &sample.path)?;
                Ok((image, self.adjusted_label(sample)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use mltools_core::{ElementType, QuantParams, TensorData};
    use std::fs;
    use tempfile::TempDir;

    fn samples(n: usize) -> Vec<ImageSample> {
        (0..n)
            .map(|i| ImageSample::new(format!("img_{i}.png"), i as Label))
            .collect()
    }

    /// Writes `n` small images and a map file labelling image i with i.
    fn write_split(dir: &Path, n: usize) {
        let mut map = String::new();
        for i in 0..n {
            let name = format!("img_{i}.png");
            ImageBuffer::from_pixel(12, 10, Rgb([i as u8 * 20, 100, 200]))
                .save(dir.join(&name))
                .unwrap();
            map.push_str(&format!("{name} {i}\n"));
        }
        fs::write(dir.join("val_map.txt"), map).unwrap();
    }

    #[test]
    fn test_batches_cover_samples_exactly() {
        for total in 1..=17 {
            for batch_size in 1..=6 {
                for cap in [None, Some(1), Some(5), Some(40)] {
                    let split = DatasetSplit::new(samples(total), batch_size, cap).unwrap();
                    let expected = cap.map_or(total, |c| c.min(total));
                    assert_eq!(split.num_samples(), expected);
                    assert_eq!(split.num_batches(), expected.div_ceil(batch_size));

                    let mut next = 0;
                    for batch_id in 0..split.num_batches() {
                        let range = split.batch_range(batch_id).unwrap();
                        assert_eq!(range.start, next);
                        assert!(!range.is_empty());
                        assert!(range.len() <= batch_size);
                        next = range.end;
                    }
                    assert_eq!(next, expected);
                }
            }
        }
    }

    #[test]
    fn test_batch_sizes_ten_by_four() {
        let split = DatasetSplit::new(samples(10), 4, None).unwrap();
        let sizes: Vec<usize> = (0..split.num_batches())
            .map(|b| split.batch_samples(b).unwrap().len())
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(split.batch_range(3).is_err());
    }

    #[test]
    fn test_zero_batch_size_is_config_error() {
        assert!(matches!(
            DatasetSplit::new(samples(3), 0, None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_read_batch_applies_offset_and_preprocessing() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), 5);

        let loader = ImageLoader::new(dir.path());
        let split =
            DatasetSplit::from_map_file(&loader, Path::new("val_map.txt"), 2, None).unwrap();
        let pipeline = InputPipeline::for_model(
            Preprocessor::MobileNet,
            TensorDetails::float(vec![1, 8, 8, 3]),
            true,
            false,
        );
        let source = DatasetBatchSource::new(split, loader, pipeline, -1);

        assert_eq!(source.num_batches(), 3);
        let last = source.read_batch(2).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].1, 3);
        assert_eq!(last[0].0.shape, vec![8, 8, 3]);

        let first = source.read_batch(0).unwrap();
        let labels: Vec<Label> = first.iter().map(|(_, l)| *l).collect();
        assert_eq!(labels, vec![-1, 0]);
    }

    #[test]
    fn test_read_batch_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), 4);

        let loader = ImageLoader::new(dir.path());
        let split =
            DatasetSplit::from_map_file(&loader, Path::new("val_map.txt"), 3, None).unwrap();
        let input = TensorDetails::quantized(
            vec![1, 4, 4, 3],
            ElementType::I8,
            QuantParams::new(1.0 / 128.0, 0),
        );
        let pipeline = InputPipeline::for_model(Preprocessor::MobileNet, input, true, false);
        let source = DatasetBatchSource::new(split, loader, pipeline, 0);

        let later = source.read_batch(1).unwrap();
        let first = source.read_batch(0).unwrap();
        let again = source.read_batch(1).unwrap();
        assert_eq!(later, again);
        assert_eq!(first.len(), 3);
        assert!(matches!(first[0].0.data, TensorData::I8(_)));
    }

    #[test]
    fn test_missing_image_fails_batch() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), 2);
        fs::remove_file(dir.path().join("img_1.png")).unwrap();

        let loader = ImageLoader::new(dir.path());
        let split =
            DatasetSplit::from_map_file(&loader, Path::new("val_map.txt"), 2, None).unwrap();
        let pipeline = InputPipeline::for_model(
            Preprocessor::Vgg,
            TensorDetails::float(vec![1, 4, 4, 3]),
            true,
            false,
        );
        let source = DatasetBatchSource::new(split, loader, pipeline, 0);
        assert!(matches!(source.read_batch(0), Err(Error::Config(_))));
    }

    #[test]
    fn test_numpy_source_is_quantized() {
        use ndarray::Array3;
        use ndarray_npy::WriteNpyExt;

        let dir = TempDir::new().unwrap();
        let array = Array3::from_shape_vec((1, 2, 3), vec![-1.0f32, -0.5, 0.0, 0.5, 1.0, 0.25])
            .unwrap();
        array
            .write_npy(fs::File::create(dir.path().join("img_0.JPEG.npy")).unwrap())
            .unwrap();

        let loader = ImageLoader::new(dir.path());
        let input = TensorDetails::quantized(
            vec![1, 1, 2, 3],
            ElementType::I8,
            QuantParams::new(1.0 / 128.0, 0),
        );

        let pipeline = InputPipeline::for_model(Preprocessor::Vgg, input.clone(), true, true);
        let image = pipeline.prepare(&loader, Path::new("img_0.JPEG")).unwrap();
        assert_eq!(image.shape, vec![1, 2, 3]);
        assert_eq!(image.data, TensorData::I8(vec![-128, -64, 0, 64, 127, 32]));

        let raw = InputPipeline::for_model(Preprocessor::Vgg, input, false, true);
        let image = raw.prepare(&loader, Path::new("img_0.JPEG")).unwrap();
        assert_eq!(
            image.data,
            TensorData::F32(vec![-1.0, -0.5, 0.0, 0.5, 1.0, 0.25])
        );

        assert!(matches!(
            pipeline.prepare(&loader, Path::new("img_1.JPEG")),
            Err(Error::Config(_))
        ));
    }
}
