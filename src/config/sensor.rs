//! Sensor backend selection and acquisition settings.

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::core::measurement::Measurement;

/// Where readings come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorBackend {
    /// Kernel IIO driver under `/sys/bus/iio/devices`.
    #[default]
    Hardware,
    /// Fixed values from `stub_values`.
    Stub,
}

/// What to do when the sensor produced only some of its measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialReadPolicy {
    /// Publish whatever was read.
    #[default]
    PublishAvailable,
    /// Publish nothing unless every measurement was read.
    RequireAll,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SensorConfig {
    pub backend: SensorBackend,

    /// Explicit IIO device directory, skips discovery.
    pub iio_device: Option<PathBuf>,

    /// Directory scanned for `iio:device*` entries.
    pub iio_root: PathBuf,

    /// Read attempts for sensors with an unreliable bus (DHT22).
    #[validate(range(min = 1, max = 100, message = "Retries must be between 1 and 100"))]
    pub retries: u32,

    /// Pause between attempts, in milliseconds.
    #[validate(range(max = 60000, message = "Retry delay must not exceed 60000 ms"))]
    pub retry_delay_ms: u64,

    /// Values returned by the stub backend, keyed by measurement name.
    #[validate(custom(function = "validate_stub_values"))]
    pub stub_values: BTreeMap<String, f64>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            backend: SensorBackend::default(),
            iio_device: None,
            iio_root: PathBuf::from("/sys/bus/iio/devices"),
            retries: 15,
            retry_delay_ms: 2000,
            stub_values: BTreeMap::new(),
        }
    }
}

impl SensorConfig {
    /// Stub values with their measurement names resolved.
    pub fn stub_readings(&self) -> impl Iterator<Item = (Measurement, f64)> + '_ {
        self.stub_values
            .iter()
            .filter_map(|(name, value)| name.parse().ok().map(|m| (m, *value)))
    }
}

fn validate_stub_values(values: &BTreeMap<String, f64>) -> Result<(), ValidationError> {
    for name in values.keys() {
        if name.parse::<Measurement>().is_err() {
            let mut err = ValidationError::new("unknown_measurement");
            err.message = Some(format!("Unknown measurement in stub_values: {}", name).into());
            return Err(err);
        }
    }
    Ok(())
}
