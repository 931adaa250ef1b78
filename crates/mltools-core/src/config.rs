//! Configuration structures for the evaluation and calibration tools.
//!
//! Both configs can be read from a TOML file (every field is optional there)
//! and are validated before any dataset or model is touched.

use crate::error::{Error, Result};
use crate::types::{Accelerator, Preprocessor};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default name of the label map inside a dataset split directory
pub const DEFAULT_MAP_FILE: &str = "val_map.txt";

/// Batch size used when none is configured: one engine per available core.
pub fn default_batch_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Configuration of an evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Path to the classifier model artifact
    pub model_path: PathBuf,
    /// Model-family preprocessing transform
    pub preprocessor: Preprocessor,
    /// Directory holding the dataset split and its map file
    pub dataset_split_path: PathBuf,
    /// Name of the map file inside `dataset_split_path`
    pub map_file: String,
    /// Images per batch, also the engine pool size
    pub batch_size: usize,
    /// Cap on the number of samples evaluated
    pub max_samples: Option<usize>,
    /// Added to every ground-truth label (e.g. -1 for models without a background class)
    pub label_offset: i64,
    /// Quantize images for i8/u8 models
    pub quantize_input: bool,
    /// Rank the engine's score vector; when false the output already is a label
    pub postprocess_predictions: bool,
    /// Read preprocessed `<file>.npy` arrays instead of decoding images
    pub read_from_numpy: bool,
    /// Hardware the engines are bound to
    pub accelerator: Accelerator,
    /// Per-inference deadline in milliseconds
    pub inference_deadline_ms: Option<u64>,
    /// Where the JSON metrics artifact is written
    pub metrics_output_path: PathBuf,
    /// Optional line-oriented compatibility log
    pub compat_output_path: Option<PathBuf>,
    /// Directory for the JSON debug log
    pub log_path: Option<PathBuf>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            preprocessor: Preprocessor::MobileNet,
            dataset_split_path: PathBuf::new(),
            map_file: DEFAULT_MAP_FILE.to_string(),
            batch_size: default_batch_size(),
            max_samples: None,
            label_offset: 0,
            quantize_input: true,
            postprocess_predictions: true,
            read_from_numpy: false,
            accelerator: Accelerator::Cpu,
            inference_deadline_ms: None,
            metrics_output_path: PathBuf::from("metrics.json"),
            compat_output_path: None,
            log_path: None,
        }
    }
}

impl EvaluationConfig {
    /// Path of the label map file
    pub fn map_file_path(&self) -> PathBuf {
        self.dataset_split_path.join(&self.map_file)
    }

    /// Per-inference deadline, if any
    pub fn inference_deadline(&self) -> Option<Duration> {
        self.inference_deadline_ms.map(Duration::from_millis)
    }

    /// Rejects configurations that cannot start a run
    pub fn validate(&self) -> Result<()> {
        if self.model_path.as_os_str().is_empty() {
            return Err(Error::Config("Model path is required".to_string()));
        }
        if self.dataset_split_path.as_os_str().is_empty() {
            return Err(Error::Config("Dataset split path is required".to_string()));
        }
        if self.map_file.trim().is_empty() {
            return Err(Error::Config("Map file name must not be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("Batch size must be greater than 0".to_string()));
        }
        if self.max_samples == Some(0) {
            return Err(Error::Config("Max samples must be greater than 0".to_string()));
        }
        if self.inference_deadline_ms == Some(0) {
            return Err(Error::Config(
                "Inference deadline must be greater than 0 ms".to_string(),
            ));
        }
        if self.metrics_output_path.as_os_str().is_empty() {
            return Err(Error::Config("Metrics output path is required".to_string()));
        }
        Ok(())
    }
}

/// Configuration of a calibration run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Float model to calibrate
    pub input_model_path: PathBuf,
    /// Where the quantizer's artifact is written
    pub output_model_path: PathBuf,
    /// Model-family preprocessing transform
    pub preprocessor: Preprocessor,
    /// Text file listing calibration images, one relative path per line
    pub image_file_list_path: PathBuf,
    /// Directory the listed paths are relative to
    pub dataset_split_path: PathBuf,
    /// Input height and width fed to the model
    pub input_size: (u32, u32),
    /// Directory for the JSON debug log
    pub log_path: Option<PathBuf>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            input_model_path: PathBuf::new(),
            output_model_path: PathBuf::new(),
            preprocessor: Preprocessor::MobileNet,
            image_file_list_path: PathBuf::new(),
            dataset_split_path: PathBuf::new(),
            input_size: (224, 224),
            log_path: None,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_model_path.as_os_str().is_empty() {
            return Err(Error::Config("Input model path is required".to_string()));
        }
        if self.output_model_path.as_os_str().is_empty() {
            return Err(Error::Config("Output model path is required".to_string()));
        }
        if self.image_file_list_path.as_os_str().is_empty() {
            return Err(Error::Config("Image file list path is required".to_string()));
        }
        if self.input_size.0 == 0 || self.input_size.1 == 0 {
            return Err(Error::Config(format!(
                "Input size must be non-zero, got {}x{}",
                self.input_size.0, self.input_size.1
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> EvaluationConfig {
        EvaluationConfig {
            model_path: PathBuf::from("model.tflite"),
            dataset_split_path: PathBuf::from("imagenet/val"),
            ..EvaluationConfig::default()
        }
    }

    #[test]
    fn test_default_evaluation_config() {
        let config = EvaluationConfig::default();
        assert_eq!(config.map_file, "val_map.txt");
        assert!(config.batch_size >= 1);
        assert!(config.quantize_input);
        assert!(config.postprocess_predictions);
        assert_eq!(config.accelerator, Accelerator::Cpu);
    }

    #[test]
    fn test_validate_rejects_missing_model() {
        let config = EvaluationConfig::default();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch_and_cap() {
        let mut config = valid_config();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.max_samples = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_map_file_path() {
        let config = valid_config();
        assert_eq!(
            config.map_file_path(),
            PathBuf::from("imagenet/val/val_map.txt")
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EvaluationConfig = toml::from_str(
            r#"
            model_path = "mobilenet_v1_quant.tflite"
            preprocessor = "vgg"
            batch_size = 8
            label_offset = -1
            "#,
        )
        .unwrap();
        assert_eq!(config.preprocessor, Preprocessor::Vgg);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.label_offset, -1);
        assert_eq!(config.map_file, DEFAULT_MAP_FILE);
    }

    #[test]
    fn test_calibration_config_validation() {
        let mut config = CalibrationConfig::default();
        assert!(config.validate().is_err());

        config.input_model_path = PathBuf::from("float.tflite");
        config.output_model_path = PathBuf::from("calibration.json");
        config.image_file_list_path = PathBuf::from("calibration_images.txt");
        assert!(config.validate().is_ok());

        config.input_size = (0, 224);
        assert!(config.validate().is_err());
    }
}
