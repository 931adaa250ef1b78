//! Metric Series Export Tool
//!
//! Pulls one named field from every batch of one or more metrics artifacts
//! and writes the series side by side as CSV, ready for charting.

use anyhow::{Context, Result};
use clap::Parser;
use mltools_core::setup_cli_logging;
use mltools_eval::{write_series_csv, MetricSeries};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{debug, info};

/// Metric Series Export Tool
#[derive(Parser, Debug)]
#[command(
    name = "metrics-series",
    about = "Export per-batch metric series from evaluation artifacts as CSV"
)]
struct Args {
    /// Metrics artifacts holding the data series
    #[arg(short = 'i', long = "inputs", value_name = "PATH", num_args = 1.., required = true)]
    inputs: Vec<PathBuf>,

    /// Per-batch field to export, e.g. accuracy or cumulative_top_5_accuracy
    #[arg(short = 'y', long, default_value = "cumulative_accuracy")]
    field: String,

    /// Series names, one per input (default: artifact file stems)
    #[arg(short = 'n', long, value_name = "NAME", num_args = 1..)]
    series_names: Vec<String>,

    /// CSV output file
    #[arg(short = 'o', long, value_name = "FILE")]
    output: PathBuf,

    /// Directory for the JSON debug log
    #[arg(long, value_name = "DIR")]
    log_path: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose, args.log_path.as_deref())?;
    info!("metrics-series {:?}", args);

    run(&args)
}

fn run(args: &Args) -> Result<()> {
    if !args.series_names.is_empty() && args.series_names.len() != args.inputs.len() {
        anyhow::bail!(
            "Got {} series names for {} inputs",
            args.series_names.len(),
            args.inputs.len()
        );
    }

    let series = args
        .inputs
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let name = args.series_names.get(i).cloned();
            MetricSeries::load(path, &args.field, name)
                .with_context(|| format!("Failed to read series from {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(?series, "Loaded series");

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    write_series_csv(BufWriter::new(file), &series)?;

    info!(
        "Wrote {} series of '{}' to {}",
        series.len(),
        args.field,
        args.output.display()
    );
    Ok(())
}
