//! Per-batch metric records and the JSON metrics artifact.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use mltools_core::{BatchMetrics, Error, EvaluationConfig, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compat::CompatLog;

/// Everything one evaluation run produced, in batch-id order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsArtifact {
    /// Name of the tool that produced the artifact
    pub tool: String,
    pub created_at: DateTime<Utc>,
    /// Arguments identifying the run
    pub config: EvaluationConfig,
    pub batches: Vec<BatchMetrics>,
}

impl MetricsArtifact {
    pub fn new(
        tool: impl Into<String>,
        config: EvaluationConfig,
        batches: Vec<BatchMetrics>,
    ) -> Self {
        Self {
            tool: tool.into(),
            created_at: Utc::now(),
            config,
            batches,
        }
    }

    /// Writes pretty-printed JSON, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Metrics saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::NotFound(format!("Metrics artifact {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Values of a named numeric field, one per batch
    pub fn series(&self, field: &str) -> Result<Vec<f64>> {
        self.batches
            .iter()
            .map(|batch| {
                batch.field(field).ok_or_else(|| {
                    Error::Config(format!("Unknown metrics field '{field}'"))
                })
            })
            .collect()
    }
}

/// Collects batch records in order and mirrors them to the compatibility log
pub struct ReportSink<W: Write = File> {
    records: Vec<BatchMetrics>,
    compat: Option<CompatLog<W>>,
}

impl<W: Write> ReportSink<W> {
    pub fn new(compat: Option<CompatLog<W>>) -> Self {
        Self {
            records: Vec::new(),
            compat,
        }
    }

    /// Appends the next record; batch ids must arrive as 0, 1, 2, ...
    pub fn record(&mut self, metrics: BatchMetrics) -> Result<()> {
        if metrics.batch_id != self.records.len() {
            return Err(Error::InvalidArgument(format!(
                "Expected batch {}, got batch {}",
                self.records.len(),
                metrics.batch_id
            )));
        }

        if let Some(compat) = self.compat.as_mut() {
            compat.write_batch(&metrics)?;
        }
        self.records.push(metrics);
        Ok(())
    }

    pub fn records(&self) -> &[BatchMetrics] {
        &self.records
    }

    pub fn into_artifact(
        self,
        tool: impl Into<String>,
        config: EvaluationConfig,
    ) -> MetricsArtifact {
        MetricsArtifact::new(tool, config, self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mltools_core::MetricsAccumulator;
    use tempfile::TempDir;

    fn three_batches() -> Vec<BatchMetrics> {
        let mut accumulator = MetricsAccumulator::new(true);
        let scores = |best: usize| {
            let mut s = vec![0.1; 8];
            s[best] = 0.9;
            s
        };
        vec![
            accumulator.update(0, &[scores(1), scores(2)], &[1, 5]).unwrap(),
            accumulator.update(1, &[scores(3), scores(4)], &[3, 4]).unwrap(),
            accumulator.update(2, &[scores(0)], &[7]).unwrap(),
        ]
    }

    #[test]
    fn test_artifact_roundtrip_preserves_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("metrics.json");

        let mut sink: ReportSink = ReportSink::new(None);
        for batch in three_batches() {
            sink.record(batch).unwrap();
        }
        let artifact = sink.into_artifact("evaluate", EvaluationConfig::default());
        artifact.save(&path).unwrap();

        let loaded = MetricsArtifact::load(&path).unwrap();
        assert_eq!(loaded.tool, "evaluate");
        assert_eq!(loaded.created_at, artifact.created_at);
        assert_eq!(loaded.batches, three_batches());
        assert_eq!(loaded.config.map_file, "val_map.txt");
    }

    #[test]
    fn test_series_by_field_name() {
        let artifact =
            MetricsArtifact::new("evaluate", EvaluationConfig::default(), three_batches());
        assert_eq!(artifact.series("accuracy").unwrap(), vec![0.5, 1.0, 0.0]);
        assert_eq!(artifact.series("cumulative_accuracy").unwrap(), vec![0.5, 0.75, 0.6]);
        assert!(matches!(artifact.series("f1"), Err(Error::Config(_))));
    }

    #[test]
    fn test_sink_rejects_out_of_order_batches() {
        let mut batches = three_batches();
        let mut sink: ReportSink = ReportSink::new(None);
        assert!(sink.record(batches.remove(1)).is_err());
        assert!(sink.record(batches.remove(0)).is_ok());
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn test_sink_streams_compat_lines() {
        let compat = CompatLog::new(Vec::new(), 5, 2);
        let mut sink = ReportSink::new(Some(compat));
        for batch in three_batches() {
            sink.record(batch).unwrap();
        }
        let compat = sink.compat.take().unwrap();
        let text = String::from_utf8(compat.into_inner().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.ends_with("self.good = 4/4 = 0.600, result = 0, expected = 7\n"));
    }
}
