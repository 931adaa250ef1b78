//! Error types for the mltools workspace.

use thiserror::Error;

/// Main error type for evaluation, calibration and reporting.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (bad arguments, malformed map file, unknown preprocessor)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Image decoding or preprocessing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Dataset error
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// The model artifact could not be parsed
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// The requested accelerator delegate is not available
    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// Raised by an engine during invocation
    #[error("Inference error: {0}")]
    Inference(String),

    /// An inference task ran past its deadline
    #[error("Inference deadline exceeded: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Specialized Result type for mltools operations.
pub type Result<T> = std::result::Result<T, Error>;
