//! Line-oriented compatibility log, one line per evaluated image.
//!
//! Each line reads as below, without the wrap:
//!
//! ```text
//! self.good = <index>/<num_samples - 1> = <running accuracy>, result = <predicted>,
//! expected = <label>
//! ```

use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::Path;

use mltools_core::{BatchMetrics, Error, Result};

/// Append-only writer flushed after every line
pub struct CompatLog<W: Write> {
    writer: LineWriter<W>,
    num_samples: usize,
    batch_size: usize,
}

impl CompatLog<File> {
    /// Truncates or creates the log file
    pub fn create(path: &Path, num_samples: usize, batch_size: usize) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            Error::Config(format!(
                "Failed to create compatibility log {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self::new(file, num_samples, batch_size))
    }
}

impl<W: Write> CompatLog<W> {
    pub fn new(writer: W, num_samples: usize, batch_size: usize) -> Self {
        Self {
            writer: LineWriter::new(writer),
            num_samples,
            batch_size,
        }
    }

    /// Writes one line per image of `batch`.
    ///
    /// The running accuracy starts from the totals before this batch and
    /// counts the batch's recorded top-1 hits one image at a time.
    pub fn write_batch(&mut self, batch: &BatchMetrics) -> Result<()> {
        if batch.top_1_correct.len() != batch.num_images {
            return Err(Error::InvalidArgument(format!(
                "Batch {} records correctness for {} of {} images",
                batch.batch_id,
                batch.top_1_correct.len(),
                batch.num_images
            )));
        }

        let mut good = batch.cumulative_true_positives - batch.true_positives;
        let mut seen = batch.cumulative_images - batch.num_images;
        let last_index = self.num_samples as i64 - 1;

        let images = batch
            .predicted_labels()
            .zip(&batch.gtlabels)
            .zip(&batch.top_1_correct);
        for (i, ((predicted, expected), &correct)) in images.enumerate() {
            good += usize::from(correct);
            seen += 1;
            writeln!(
                self.writer,
                "self.good = {}/{} = {:.3}, result = {}, expected = {}",
                batch.batch_id * self.batch_size + i,
                last_index,
                good as f64 / seen as f64,
                predicted,
                expected
            )?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}
