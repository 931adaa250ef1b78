//! Per-batch fan-out of inference tasks over the engine pool.

use std::time::{Duration, Instant};

use mltools_core::{Error, ImageTensor, Prediction, Result};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::engine::InferenceEngine;
use crate::pool::EnginePool;

/// Runs one inference per image, image `i` on engine slot `i`, and joins
/// them all before returning.
///
/// Tasks run on a dedicated thread pool with one worker per engine slot, so
/// evaluation never competes with image decoding on the global pool.
pub struct BatchDispatcher {
    thread_pool: rayon::ThreadPool,
    deadline: Option<Duration>,
}

impl BatchDispatcher {
    pub fn new(num_workers: usize, deadline: Option<Duration>) -> Result<Self> {
        if num_workers == 0 {
            return Err(Error::InvalidArgument(
                "Dispatcher needs at least one worker".to_string(),
            ));
        }

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|i| format!("inference-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build inference thread pool: {e}")))?;

        Ok(Self {
            thread_pool,
            deadline,
        })
    }

    /// Workers in the dedicated thread pool
    pub fn num_workers(&self) -> usize {
        self.thread_pool.current_num_threads()
    }

    /// Predictions in the order of `images`.
    ///
    /// Every task is joined before returning. The failure of the lowest slot
    /// is propagated, then any task that ran past the deadline.
    pub fn dispatch<E: InferenceEngine>(
        &self,
        pool: &mut EnginePool<E>,
        images: &[ImageTensor],
    ) -> Result<Vec<Prediction>> {
        if images.len() > pool.size() {
            return Err(Error::InvalidArgument(format!(
                "Batch of {} images exceeds engine pool of {}",
                images.len(),
                pool.size()
            )));
        }

        let engines = &mut pool.engines_mut()[..images.len()];
        let outcomes: Vec<(Result<Prediction>, Duration)> = self.thread_pool.install(|| {
            engines
                .par_iter_mut()
                .zip(images.par_iter())
                .with_max_len(1)
                .map(|(engine, image)| {
                    let start = Instant::now();
                    let prediction = engine.infer(image);
                    (prediction, start.elapsed())
                })
                .collect()
        });

        let mut predictions = Vec::with_capacity(outcomes.len());
        let mut slowest: Option<(usize, Duration)> = None;
        for (slot, (prediction, elapsed)) in outcomes.into_iter().enumerate() {
            debug!(slot, elapsed_ms = elapsed.as_millis() as u64, "Inference finished");
            match prediction {
                Ok(scores) => predictions.push(scores),
                Err(e) => {
                    warn!("Inference failed on slot {}: {}", slot, e);
                    return Err(e);
                }
            }
            if slowest.map_or(true, |(_, d)| elapsed > d) {
                slowest = Some((slot, elapsed));
            }
        }

        if let (Some(deadline), Some((slot, elapsed))) = (self.deadline, slowest) {
            if elapsed > deadline {
                warn!(
                    "Inference on slot {} took {} ms, deadline is {} ms",
                    slot,
                    elapsed.as_millis(),
                    deadline.as_millis()
                );
                return Err(Error::Timeout(format!(
                    "slot {slot} took {} ms (deadline {} ms)",
                    elapsed.as_millis(),
                    deadline.as_millis()
                )));
            }
        }

        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ModelSource;
    use crate::testing::{first_value, one_hot, MockLoader};
    use mltools_core::{Accelerator, TensorDetails};
    use rand::Rng;
    use std::thread;

    const NUM_CLASSES: usize = 16;

    fn pool_with<F>(size: usize, infer_fn: F) -> EnginePool<crate::testing::MockEngine>
    where
        F: Fn(&ImageTensor) -> Result<Prediction> + Send + Sync + 'static,
    {
        let loader = MockLoader::new(TensorDetails::float(vec![1, 1]), NUM_CLASSES, infer_fn);
        EnginePool::load(&loader, &ModelSource::Bytes(vec![0xAB]), size, Accelerator::Cpu).unwrap()
    }

    fn images(values: &[f32]) -> Vec<ImageTensor> {
        values
            .iter()
            .map(|&v| ImageTensor::from_f32(vec![1], vec![v]))
            .collect()
    }

    #[test]
    fn test_results_follow_input_order_under_random_delays() {
        let mut pool = pool_with(8, |image| {
            let delay = rand::thread_rng().gen_range(0..20);
            thread::sleep(Duration::from_millis(delay));
            Ok(one_hot(first_value(image)? as usize, NUM_CLASSES))
        });
        let dispatcher = BatchDispatcher::new(pool.size(), None).unwrap();

        for _ in 0..5 {
            let values: Vec<f32> = (0..8).rev().map(|v| v as f32).collect();
            let predictions = dispatcher.dispatch(&mut pool, &images(&values)).unwrap();
            let classes: Vec<f32> = predictions
                .iter()
                .map(|p| p.iter().position(|&s| s == 1.0).unwrap() as f32)
                .collect();
            assert_eq!(classes, values);
        }
    }

    #[test]
    fn test_partial_batch_uses_leading_slots() {
        let mut pool = pool_with(4, |image| Ok(one_hot(first_value(image)? as usize, NUM_CLASSES)));
        let dispatcher = BatchDispatcher::new(4, None).unwrap();

        let predictions = dispatcher.dispatch(&mut pool, &images(&[3.0, 1.0])).unwrap();
        assert_eq!(predictions.len(), 2);

        let counts: Vec<usize> = pool.engines_mut().iter().map(|e| e.invocations()).collect();
        assert_eq!(counts, vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let mut pool = pool_with(2, |_| Ok(vec![0.0; NUM_CLASSES]));
        let dispatcher = BatchDispatcher::new(2, None).unwrap();
        let result = dispatcher.dispatch(&mut pool, &images(&[0.0, 1.0, 2.0]));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_engine_failure_propagates_after_join() {
        let mut pool = pool_with(3, |image| {
            if first_value(image)? == 1.0 {
                Err(Error::Inference("tensor allocation failed".to_string()))
            } else {
                Ok(vec![0.0; NUM_CLASSES])
            }
        });
        let dispatcher = BatchDispatcher::new(3, None).unwrap();
        let result = dispatcher.dispatch(&mut pool, &images(&[0.0, 1.0, 2.0]));
        assert!(matches!(result, Err(Error::Inference(_))));

        // The other slots still ran to completion.
        let counts: Vec<usize> = pool.engines_mut().iter().map(|e| e.invocations()).collect();
        assert_eq!(counts, vec![1, 1, 1]);
    }

    #[test]
    fn test_deadline_exceeded_is_timeout() {
        let mut pool = pool_with(2, |_| {
            thread::sleep(Duration::from_millis(30));
            Ok(vec![0.0; NUM_CLASSES])
        });
        let strict = BatchDispatcher::new(2, Some(Duration::from_millis(1))).unwrap();
        let result = strict.dispatch(&mut pool, &images(&[0.0, 1.0]));
        assert!(matches!(result, Err(Error::Timeout(_))));

        let relaxed = BatchDispatcher::new(2, Some(Duration::from_secs(30))).unwrap();
        assert!(relaxed.dispatch(&mut pool, &images(&[0.0, 1.0])).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(BatchDispatcher::new(0, None).is_err());
    }
}
