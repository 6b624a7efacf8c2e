use super::{types::SensorResult, Sample, SensorModel};
use crate::core::measurement::Measurement;

/// Contract for anything that can acquire a sensor sample.
///
/// `read` is called at most once per run. Implementations apply their own
/// retry policy and return whatever subset of [`measurements`](Self::measurements)
/// they managed to read; `Err` means nothing at all could be read.
#[async_trait::async_trait]
pub trait SensorReader: Send + Sync {
    fn model(&self) -> SensorModel;

    fn measurements(&self) -> &'static [Measurement] {
        self.model().measurements()
    }

    async fn read(&self) -> SensorResult<Sample>;
}
