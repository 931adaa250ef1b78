//! Shared CLI helpers for workspace tools.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter, Layer};

use crate::{Error, Result};

/// File name of the JSON debug log written inside the log directory
pub const LOG_FILE_NAME: &str = "mltools-log.json";

/// Installs the global subscriber: a console layer at info (debug when
/// `verbose`) and, when `log_dir` is set, a JSON file layer at debug.
pub fn setup_cli_logging(verbose: bool, log_dir: Option<&Path>) -> Result<()> {
    let console_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let json_layer = log_dir.map(json_file_layer).transpose()?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(json_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

/// JSON lines layer at debug, appending to `LOG_FILE_NAME` inside `dir`
pub fn json_file_layer<S>(dir: &Path) -> Result<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fs::create_dir_all(dir).map_err(|e| {
        Error::Config(format!("Failed to create log directory {}: {e}", dir.display()))
    })?;
    let log_file = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .map_err(|e| {
            Error::Config(format!("Failed to open log file {}: {e}", log_file.display()))
        })?;

    Ok(fmt::layer()
        .json()
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::DEBUG))
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EvaluationConfig;
    use tempfile::TempDir;

    #[test]
    fn test_load_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eval.toml");
        fs::write(
            &path,
            "model_path = \"m.tflite\"\ndataset_split_path = \"val\"\nmax_samples = 100\n",
        )
        .unwrap();

        let config: EvaluationConfig = load_toml_config(&path).unwrap();
        assert_eq!(config.max_samples, Some(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml_config_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            load_toml_config::<EvaluationConfig>(&missing),
            Err(Error::Config(_))
        ));

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "batch_size = \"eight\"").unwrap();
        assert!(matches!(
            load_toml_config::<EvaluationConfig>(&bad),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_json_file_layer_writes_debug_lines() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");
        let layer = json_file_layer(&log_dir).unwrap();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(batch_id = 3, "Batch evaluated");
            tracing::trace!("Dropped below debug");
        });

        let content = fs::read_to_string(log_dir.join(LOG_FILE_NAME)).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "DEBUG");
        assert_eq!(lines[0]["fields"]["message"], "Batch evaluated");
        assert_eq!(lines[0]["fields"]["batch_id"], 3);
    }
}
