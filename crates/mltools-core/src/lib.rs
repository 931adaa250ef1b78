//! Core types and utilities for evaluating quantized image classifiers.
//!
//! This crate provides the error type, the tensor and label types shared by
//! the dataset and engine crates, run configuration, CLI helpers and the
//! top-1/top-5 metrics accumulator.

pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use cli::*;
pub use config::*;
pub use error::{Error, Result};
pub use metrics::*;
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::{Error, Result};
    pub use crate::metrics::*;
    pub use crate::types::*;
}
