//! Calibration CLI Tool
//!
//! Streams a list of representative images, preprocessed one at a time,
//! through a quantizer and writes the artifact it produces.

use anyhow::{Context, Result};
use clap::Parser;
use mltools_core::{load_toml_config, setup_cli_logging, CalibrationConfig, Preprocessor};
use mltools_dataset::{CalibrationImages, ImagePreprocessor};
use mltools_engine::{Quantizer, RangeCalibrator};
use std::path::PathBuf;
use tracing::info;

/// Image Classifier Calibration Tool
#[derive(Parser, Debug)]
#[command(
    name = "calibrate",
    about = "Calibrate an image classifier on representative images",
    long_about = "Feed a list of representative images, one preprocessed image at a time, \
                  to the quantizer and write the int8 calibration it produces."
)]
struct Args {
    /// TOML file with a calibration config; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the float image classifier model
    #[arg(short = 'i', long, value_name = "FILE", alias = "input-tflite-model-path")]
    input_model_path: Option<PathBuf>,

    /// Where the calibration output is written
    #[arg(short = 'o', long, value_name = "FILE", alias = "output-tflite-model-path")]
    output_model_path: Option<PathBuf>,

    /// Model preprocessor
    #[arg(short = 'p', long, value_enum)]
    preprocessor: Option<Preprocessor>,

    /// Text file listing calibration images, one path per line
    #[arg(short = 'l', long, value_name = "FILE")]
    image_file_list_path: Option<PathBuf>,

    /// Directory the listed image paths are relative to
    #[arg(short = 'd', long, value_name = "DIR")]
    dataset_split_path: Option<PathBuf>,

    /// Model input height
    #[arg(long)]
    input_height: Option<u32>,

    /// Model input width
    #[arg(long)]
    input_width: Option<u32>,

    /// Directory for the JSON debug log
    #[arg(long, value_name = "DIR")]
    log_path: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = build_config(&args)?;

    setup_cli_logging(args.verbose, config.log_path.as_deref())?;
    info!("calibrate {:?}", config);

    config.validate().context("Invalid calibration configuration")?;
    run(&config)
}

fn build_config(args: &Args) -> Result<CalibrationConfig> {
    let mut config: CalibrationConfig = match &args.config {
        Some(path) => load_toml_config(path)?,
        None => CalibrationConfig::default(),
    };

    if let Some(path) = &args.input_model_path {
        config.input_model_path = path.clone();
    }
    if let Some(path) = &args.output_model_path {
        config.output_model_path = path.clone();
    }
    if let Some(preprocessor) = args.preprocessor {
        config.preprocessor = preprocessor;
    }
    if let Some(path) = &args.image_file_list_path {
        config.image_file_list_path = path.clone();
    }
    if let Some(path) = &args.dataset_split_path {
        config.dataset_split_path = path.clone();
    }
    if let Some(height) = args.input_height {
        config.input_size.0 = height;
    }
    if let Some(width) = args.input_width {
        config.input_size.1 = width;
    }
    if args.log_path.is_some() {
        config.log_path = args.log_path.clone();
    }

    Ok(config)
}

fn run(config: &CalibrationConfig) -> Result<()> {
    let model = std::fs::read(&config.input_model_path).with_context(|| {
        format!("Failed to read model {}", config.input_model_path.display())
    })?;

    let (height, width) = config.input_size;
    let mut images = CalibrationImages::from_list_file(
        &config.image_file_list_path,
        &config.dataset_split_path,
        ImagePreprocessor::new(config.preprocessor, height, width),
    )
    .context("Failed to read image list")?;
    info!("Calibrating with {} images", images.len());

    let mut quantizer = RangeCalibrator::new();
    let output = quantizer
        .calibrate_and_quantize(&model, &mut images)
        .context("Calibration failed")?;

    if let Some(parent) = config.output_model_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
    }
    std::fs::write(&config.output_model_path, output).with_context(|| {
        format!("Failed to write {}", config.output_model_path.display())
    })?;

    info!("Calibration saved to: {}", config.output_model_path.display());
    Ok(())
}
