//! Named metric series pulled from metrics artifacts, exported as CSV for
//! external charting.

use std::io::Write;
use std::path::Path;

use mltools_core::{Error, Result};

use crate::report::MetricsArtifact;

/// One named series, one value per batch
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub name: String,
    pub values: Vec<f64>,
}

impl MetricSeries {
    /// Extracts `field` from every batch of `artifact`
    pub fn from_artifact(
        name: impl Into<String>,
        artifact: &MetricsArtifact,
        field: &str,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            values: artifact.series(field)?,
        })
    }

    /// Loads an artifact and names the series after the file stem
    pub fn load(path: &Path, field: &str, name: Option<String>) -> Result<Self> {
        let artifact = MetricsArtifact::load(path)?;
        let name = name.unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        });
        Self::from_artifact(name, &artifact, field)
    }
}

fn csv_error(e: csv::Error) -> Error {
    Error::Serialization(e.to_string())
}

/// Writes a `batch` column followed by one column per series.
///
/// Shorter series leave their trailing cells empty.
pub fn write_series_csv<W: Write>(writer: W, series: &[MetricSeries]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec!["batch".to_string()];
    header.extend(series.iter().map(|s| s.name.clone()));
    csv.write_record(&header).map_err(csv_error)?;

    let num_rows = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    for row in 0..num_rows {
        let mut record = vec![row.to_string()];
        record.extend(
            series
                .iter()
                .map(|s| s.values.get(row).map(f64::to_string).unwrap_or_default()),
        );
        csv.write_record(&record).map_err(csv_error)?;
    }

    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mltools_core::{EvaluationConfig, MetricsAccumulator};
    use tempfile::TempDir;

    fn artifact(correct: &[bool]) -> MetricsArtifact {
        let mut accumulator = MetricsAccumulator::new(true);
        let batches = correct
            .iter()
            .enumerate()
            .map(|(batch_id, &ok)| {
                let label = if ok { 0 } else { 1 };
                accumulator.update(batch_id, &[vec![1.0, 0.0]], &[label]).unwrap()
            })
            .collect();
        MetricsArtifact::new("evaluate", EvaluationConfig::default(), batches)
    }

    #[test]
    fn test_csv_layout() {
        let series = vec![
            MetricSeries::from_artifact("float", &artifact(&[true, true, false]), "accuracy")
                .unwrap(),
            MetricSeries::from_artifact("int8", &artifact(&[false, true]), "accuracy").unwrap(),
        ];

        let mut out = Vec::new();
        write_series_csv(&mut out, &series).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "batch,float,int8\n0,1,0\n1,1,1\n2,0,\n");
    }

    #[test]
    fn test_load_names_series_after_file_stem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mobilenet_int8.json");
        artifact(&[true, false]).save(&path).unwrap();

        let series = MetricSeries::load(&path, "cumulative_accuracy", None).unwrap();
        assert_eq!(series.name, "mobilenet_int8");
        assert_eq!(series.values, vec![1.0, 0.5]);

        let renamed = MetricSeries::load(&path, "accuracy", Some("int8".to_string())).unwrap();
        assert_eq!(renamed.name, "int8");
    }

    #[test]
    fn test_unknown_field_is_config_error() {
        assert!(matches!(
            MetricSeries::from_artifact("x", &artifact(&[true]), "recall"),
            Err(Error::Config(_))
        ));
    }
}
