//! Evaluation CLI Tool
//!
//! Runs an image classifier over a labelled dataset split, one engine per
//! image of a batch, and writes per-batch top-1/top-5 accuracy as a JSON
//! metrics artifact.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mltools_core::{
    load_toml_config, setup_cli_logging, Accelerator, EvaluationConfig, Preprocessor,
};
use mltools_dataset::{DatasetBatchSource, DatasetSplit, ImageLoader, InputPipeline};
use mltools_engine::{EnginePool, InferenceEngine};
use mltools_eval::{CompatLog, Evaluator, ReportSink};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Image Classifier Evaluation Tool
#[derive(Parser, Debug)]
#[command(
    name = "evaluate",
    about = "Evaluate an image classifier over a dataset validation split",
    long_about = "Infer every image of a dataset split with a pool of model engines, one per \
                  image of a batch, and record per-batch and cumulative top-1/top-5 accuracy."
)]
struct Args {
    /// TOML file with an evaluation config; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the image classifier model
    #[arg(short = 'i', long, value_name = "FILE", alias = "tflite-model-path")]
    model_path: Option<PathBuf>,

    /// Model preprocessor
    #[arg(short = 'p', long, value_enum)]
    preprocessor: Option<Preprocessor>,

    /// Directory containing the dataset validation split
    #[arg(short = 'd', long, value_name = "DIR", alias = "dataset-valsplit-path")]
    dataset_split_path: Option<PathBuf>,

    /// Label map file inside the split directory
    #[arg(long, value_name = "FILE")]
    map_file: Option<String>,

    /// Samples per batch, also the number of engines (default: number of CPUs)
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Maximum number of samples to process (default: all)
    #[arg(short = 's', long)]
    max_samples: Option<usize>,

    /// Offset added to dataset labels, e.g. -1 for models without a background class
    #[arg(short = 'l', long, allow_hyphen_values = true, alias = "model-labels-offset")]
    label_offset: Option<i64>,

    /// Do not quantize images for quantized models
    #[arg(long)]
    no_quantize_input: bool,

    /// The model output already is a label; do not rank scores
    #[arg(long)]
    no_postprocess_predictions: bool,

    /// Read preprocessed `<image>.npy` arrays instead of decoding images
    #[arg(long)]
    read_from_numpy: bool,

    /// Delegate inference to an Edge TPU
    #[arg(long)]
    delegate_to_tpu: bool,

    /// Fail a batch when any single inference takes longer than this
    #[arg(long, value_name = "MS")]
    inference_deadline_ms: Option<u64>,

    /// Path to the JSON metrics output file
    #[arg(short = 'o', long, value_name = "FILE")]
    metrics_output_path: Option<PathBuf>,

    /// Path to a compatibility log with one result line per image
    #[arg(long, value_name = "FILE", alias = "mlperf-compat-output-path")]
    compat_output_path: Option<PathBuf>,

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

    info!("Image Classifier Evaluation Tool");
    info!("================================");
    info!("evaluate {:?}", config);

    config.validate().context("Invalid evaluation configuration")?;
    run(&config)
}

/// Config file values (or defaults) overridden by any flag given
fn build_config(args: &Args) -> Result<EvaluationConfig> {
    let mut config: EvaluationConfig = match &args.config {
        Some(path) => load_toml_config(path)?,
        None => EvaluationConfig::default(),
    };

    if let Some(path) = &args.model_path {
        config.model_path = path.clone();
    }
    if let Some(preprocessor) = args.preprocessor {
        config.preprocessor = preprocessor;
    }
    if let Some(path) = &args.dataset_split_path {
        config.dataset_split_path = path.clone();
    }
    if let Some(map_file) = &args.map_file {
        config.map_file = map_file.clone();
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if args.max_samples.is_some() {
        config.max_samples = args.max_samples;
    }
    if let Some(offset) = args.label_offset {
        config.label_offset = offset;
    }
    if args.no_quantize_input {
        config.quantize_input = false;
    }
    if args.no_postprocess_predictions {
        config.postprocess_predictions = false;
    }
    if args.read_from_numpy {
        config.read_from_numpy = true;
    }
    if args.delegate_to_tpu {
        config.accelerator = Accelerator::EdgeTpu;
    }
    if args.inference_deadline_ms.is_some() {
        config.inference_deadline_ms = args.inference_deadline_ms;
    }
    if let Some(path) = &args.metrics_output_path {
        config.metrics_output_path = path.clone();
    }
    if args.compat_output_path.is_some() {
        config.compat_output_path = args.compat_output_path.clone();
    }
    if args.log_path.is_some() {
        config.log_path = args.log_path.clone();
    }

    Ok(config)
}

#[cfg(feature = "tflite")]
fn run(config: &EvaluationConfig) -> Result<()> {
    use mltools_engine::{ModelSource, TfliteLoader};

    info!("Loading model: {}", config.model_path.display());
    let pool = EnginePool::load(
        &TfliteLoader::new(),
        &ModelSource::Path(config.model_path.clone()),
        config.batch_size,
        config.accelerator,
    )
    .context("Failed to create engine pool")?;

    evaluate(config, pool)
}

#[cfg(not(feature = "tflite"))]
fn run(_config: &EvaluationConfig) -> Result<()> {
    anyhow::bail!(
        "evaluate was built without an inference backend; rebuild with `--features tflite`"
    )
}

#[cfg_attr(not(feature = "tflite"), allow(dead_code))]
fn evaluate<E: InferenceEngine>(config: &EvaluationConfig, pool: EnginePool<E>) -> Result<()> {
    let start_time = Instant::now();

    info!("Loading dataset split: {}", config.dataset_split_path.display());
    let loader = ImageLoader::new(&config.dataset_split_path);
    let split = DatasetSplit::from_map_file(
        &loader,
        Path::new(&config.map_file),
        config.batch_size,
        config.max_samples,
    )
    .context("Failed to load dataset split")?;

    let pipeline = InputPipeline::for_model(
        config.preprocessor,
        pool.input_details().clone(),
        config.quantize_input,
        config.read_from_numpy,
    );
    let source = DatasetBatchSource::new(split, loader, pipeline, config.label_offset);

    let compat = config
        .compat_output_path
        .as_deref()
        .map(|path| CompatLog::create(path, source.num_samples(), config.batch_size))
        .transpose()?;
    let mut sink = ReportSink::new(compat);

    let mut evaluator = Evaluator::new(
        source,
        pool,
        config.inference_deadline(),
        config.postprocess_predictions,
    )?;

    let progress = ProgressBar::new(evaluator.num_batches() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({eta})")?
            .progress_chars("=>-"),
    );

    let totals = evaluator
        .run(&mut sink, |_| progress.inc(1))
        .context("Evaluation failed")?;
    progress.finish_with_message("Evaluation completed");

    let artifact = sink.into_artifact("evaluate", config.clone());
    artifact
        .save(&config.metrics_output_path)
        .context("Failed to save metrics")?;

    info!("");
    info!("=== Evaluation Results ===");
    info!("Samples evaluated: {}", totals.total_images);
    info!("Top-1 accuracy: {:.2}%", 100.0 * totals.accuracy());
    info!("Top-5 accuracy: {:.2}%", 100.0 * totals.top_5_accuracy());
    info!("Evaluation time: {:.2}s", start_time.elapsed().as_secs_f64());
    info!("Results saved to: {}", config.metrics_output_path.display());

    Ok(())
}
