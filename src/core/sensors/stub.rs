use std::sync::atomic::{AtomicUsize, Ordering};

use super::{error::SensorError, traits::SensorReader, types::SensorResult, Sample, SensorModel};
use crate::core::measurement::Measurement;

/// Reader that returns fixed values and counts how often it was asked.
///
/// Only values for measurements the model reports are kept. A stub with no
/// values fails every read with [`SensorError::NoData`].
pub struct StubReader {
    model: SensorModel,
    sample: Sample,
    reads: AtomicUsize,
}

impl StubReader {
    pub fn new(model: SensorModel, values: impl IntoIterator<Item = (Measurement, f64)>) -> Self {
        let sample = values
            .into_iter()
            .filter(|(m, _)| model.measurements().contains(m))
            .collect();
        Self {
            model,
            sample,
            reads: AtomicUsize::new(0),
        }
    }

    /// Number of `read` calls so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl SensorReader for StubReader {
    fn model(&self) -> SensorModel {
        self.model
    }

    async fn read(&self) -> SensorResult<Sample> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.sample.is_empty() {
            return Err(SensorError::NoData { attempts: 1 });
        }
        Ok(self.sample.clone())
    }
}
