//! Batch evaluation harness for image classifiers.
//!
//! This crate provides:
//! - The per-batch evaluation loop over a dataset split
//! - The JSON metrics artifact and the line-oriented compatibility log
//! - Metric series extraction and CSV export

pub mod compat;
pub mod harness;
pub mod report;
pub mod series;

pub use compat::CompatLog;
pub use harness::Evaluator;
pub use report::{MetricsArtifact, ReportSink};
pub use series::{write_series_csv, MetricSeries};
