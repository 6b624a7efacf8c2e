use std::path::PathBuf;

use tracing::warn;

use super::{iio::IioDevice, traits::SensorReader, types::SensorResult, Sample, SensorModel};
use crate::{config::sensor::SensorConfig, core::measurement::Measurement};

/// The `bmp280` kernel driver also serves the older BMP180 and BMP085.
const DRIVERS: &[&str] = &["bmp180", "bmp085"];

/// BMP180 / BMP085 reader. The I2C bus is reliable, so there is a single
/// attempt per channel.
pub struct Bmp180Reader {
    device: Option<PathBuf>,
    root: PathBuf,
}

impl Bmp180Reader {
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            device: config.iio_device.clone(),
            root: config.iio_root.clone(),
        }
    }

    /// Channel file and decimal shift to reach degrees Celsius and Pascal.
    fn channel(measurement: Measurement) -> (&'static str, i32) {
        match measurement {
            Measurement::Pressure => ("in_pressure_input", 3),
            _ => ("in_temp_input", -3),
        }
    }
}

#[async_trait::async_trait]
impl SensorReader for Bmp180Reader {
    fn model(&self) -> SensorModel {
        SensorModel::Bmp180
    }

    async fn read(&self) -> SensorResult<Sample> {
        let device = match &self.device {
            Some(path) => IioDevice::open(path.clone()).await?,
            None => IioDevice::discover(&self.root, DRIVERS, None).await?,
        };

        let mut sample = Sample::new();
        let mut last_error = None;
        for &measurement in self.measurements() {
            let (channel, exponent) = Self::channel(measurement);
            match device.read_channel(channel, exponent).await {
                Ok(value) => {
                    sample.insert(measurement, value);
                }
                Err(e) => {
                    warn!(%measurement, error = %e, "BMP180 channel read failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if sample.is_empty() => Err(e),
            _ => Ok(sample),
        }
    }
}
