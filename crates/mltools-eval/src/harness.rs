//! The batch evaluation loop.
//!
//! Batches are processed strictly in order: read and preprocess, dispatch one
//! inference per image over the engine pool, join, score and hand the record
//! to the report sink. Nothing runs across batch boundaries.

use std::io::Write;
use std::time::Duration;

use mltools_core::{BatchMetrics, CumulativeMetrics, Error, Label, MetricsAccumulator, Result};
use mltools_dataset::DatasetBatchSource;
use mltools_engine::{BatchDispatcher, EnginePool, InferenceEngine};
use tracing::{debug, info};

use crate::report::ReportSink;

/// Drives a dataset split through an engine pool
pub struct Evaluator<E> {
    source: DatasetBatchSource,
    pool: EnginePool<E>,
    dispatcher: BatchDispatcher,
    accumulator: MetricsAccumulator,
}

impl<E: InferenceEngine> Evaluator<E> {
    /// The pool must hold at least one engine per image of a full batch
    pub fn new(
        source: DatasetBatchSource,
        pool: EnginePool<E>,
        deadline: Option<Duration>,
        postprocess_predictions: bool,
    ) -> Result<Self> {
        if source.batch_size() > pool.size() {
            return Err(Error::InvalidArgument(format!(
                "Batch size {} exceeds engine pool of {}",
                source.batch_size(),
                pool.size()
            )));
        }

        let dispatcher = BatchDispatcher::new(pool.size(), deadline)?;
        Ok(Self {
            source,
            pool,
            dispatcher,
            accumulator: MetricsAccumulator::new(postprocess_predictions),
        })
    }

    pub fn num_batches(&self) -> usize {
        self.source.num_batches()
    }

    /// Running totals over the batches evaluated so far
    pub fn totals(&self) -> CumulativeMetrics {
        self.accumulator.totals()
    }

    /// Evaluates one batch and folds it into the running totals
    pub fn evaluate_batch(&mut self, batch_id: usize) -> Result<BatchMetrics> {
        let (images, labels): (Vec<_>, Vec<Label>) =
            self.source.read_batch(batch_id)?.into_iter().unzip();

        let predictions = self.dispatcher.dispatch(&mut self.pool, &images)?;
        debug!(batch_id, ?predictions, "Batch predictions");

        let metrics = self.accumulator.update(batch_id, &predictions, &labels)?;
        debug!(batch_id, top_5_labels = ?metrics.top_5_labels, "Batch top-5 labels");
        debug!(?metrics, "Batch metrics");
        Ok(metrics)
    }

    /// Evaluates every batch in order, recording each into `sink`.
    ///
    /// `on_batch` sees each record before it is handed to the sink. The first
    /// failing batch aborts the run.
    pub fn run<W, F>(
        &mut self,
        sink: &mut ReportSink<W>,
        mut on_batch: F,
    ) -> Result<CumulativeMetrics>
    where
        W: Write,
        F: FnMut(&BatchMetrics),
    {
        let num_batches = self.num_batches();
        info!(
            "Processing {} batches of size {}...",
            num_batches,
            self.source.batch_size()
        );

        for batch_id in 0..num_batches {
            let metrics = self.evaluate_batch(batch_id)?;
            info!(
                "Batch {} of {}: {:.2}%",
                batch_id,
                num_batches - 1,
                100.0 * metrics.cumulative_accuracy
            );
            on_batch(&metrics);
            sink.record(metrics)?;
        }

        Ok(self.totals())
    }
}
