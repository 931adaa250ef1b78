//! Inference engines for batch evaluation.
//!
//! Engines are opaque capabilities behind [`InferenceEngine`] and
//! [`EngineLoader`]. An [`EnginePool`] owns one engine per worker slot and a
//! [`BatchDispatcher`] fans a batch out over those slots. Calibration goes
//! through the [`Quantizer`] capability.

pub mod calibrate;
pub mod dispatch;
pub mod engine;
pub mod pool;
pub mod testing;
#[cfg(feature = "tflite")]
pub mod tflite;

pub use calibrate::{CalibrationTable, Quantizer, RangeCalibrator};
pub use dispatch::BatchDispatcher;
pub use engine::{EngineLoader, InferenceEngine};
pub use pool::{EnginePool, ModelSource};
#[cfg(feature = "tflite")]
pub use tflite::{TfliteEngine, TfliteLoader};
