//! Fixed-size pool of independently loaded engines.

use std::borrow::Cow;
use std::path::PathBuf;

use mltools_core::{Accelerator, Error, Result, TensorDetails};
use tracing::{debug, info};

use crate::engine::{EngineLoader, InferenceEngine};

/// Where the model artifact comes from
#[derive(Debug, Clone)]
pub enum ModelSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl ModelSource {
    /// Raw artifact bytes; an empty artifact is an invalid model
    pub fn read(&self) -> Result<Cow<'_, [u8]>> {
        let bytes = match self {
            ModelSource::Path(path) => Cow::Owned(std::fs::read(path).map_err(|e| {
                Error::InvalidModel(format!("Failed to read model {}: {e}", path.display()))
            })?),
            ModelSource::Bytes(bytes) => Cow::Borrowed(bytes.as_slice()),
        };

        if bytes.is_empty() {
            return Err(Error::InvalidModel(format!("{self} is empty")));
        }
        Ok(bytes)
    }
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSource::Path(path) => write!(f, "model {}", path.display()),
            ModelSource::Bytes(bytes) => write!(f, "in-memory model ({} bytes)", bytes.len()),
        }
    }
}

/// One engine per worker slot, owned for the lifetime of the run
pub struct EnginePool<E> {
    engines: Vec<E>,
}

impl<E: InferenceEngine> EnginePool<E> {
    /// Loads `size` engines from the same artifact, all on `accelerator`
    pub fn load<L>(
        loader: &L,
        model: &ModelSource,
        size: usize,
        accelerator: Accelerator,
    ) -> Result<Self>
    where
        L: EngineLoader<Engine = E>,
    {
        if size == 0 {
            return Err(Error::InvalidArgument(
                "Engine pool size must be greater than 0".to_string(),
            ));
        }

        let bytes = model.read()?;
        let engines = (0..size)
            .map(|_| loader.load(&bytes, accelerator))
            .collect::<Result<Vec<_>>>()?;

        let pool = Self::from_engines(engines)?;
        info!(
            "Loaded {} engines from {} on {}",
            pool.size(),
            model,
            accelerator
        );
        debug!(
            input = ?pool.input_details(),
            output = ?pool.output_details(),
            "Engine tensor details"
        );
        Ok(pool)
    }

    /// Wraps already-built engines; their tensor details must agree
    pub fn from_engines(engines: Vec<E>) -> Result<Self> {
        let first = engines.first().ok_or_else(|| {
            Error::InvalidArgument("Engine pool needs at least one engine".to_string())
        })?;

        for (slot, engine) in engines.iter().enumerate().skip(1) {
            if engine.input_details() != first.input_details()
                || engine.output_details() != first.output_details()
            {
                return Err(Error::InvalidModel(format!(
                    "Engine {slot} exposes different tensor details than engine 0"
                )));
            }
        }

        Ok(Self { engines })
    }

    pub fn size(&self) -> usize {
        self.engines.len()
    }

    /// Input details of engine 0, representative of the pool
    pub fn input_details(&self) -> &TensorDetails {
        self.engines[0].input_details()
    }

    pub fn output_details(&self) -> &TensorDetails {
        self.engines[0].output_details()
    }

    pub(crate) fn engines_mut(&mut self) -> &mut [E] {
        &mut self.engines
    }
}
