use std::{path::PathBuf, time::Duration};

use tracing::{debug, warn};

use super::{
    error::SensorError, iio::IioDevice, traits::SensorReader, types::SensorResult, Sample,
    SensorModel,
};
use crate::{config::sensor::SensorConfig, core::measurement::Measurement};

/// Driver names the kernel uses for DHT-family sensors.
const DRIVERS: &[&str] = &["dht11"];

/// DHT22 / AM2302 reader on top of the kernel `dht11` IIO driver
/// (`dtoverlay=dht11,gpiopin=N`).
///
/// The single-wire protocol is timing sensitive and the driver fails a good
/// share of reads with EIO or ETIMEDOUT. Each attempt re-reads only the
/// channels still missing; the sensor needs about two seconds between
/// conversions.
pub struct Dht22Reader {
    gpio: Option<u8>,
    device: Option<PathBuf>,
    root: PathBuf,
    retries: u32,
    delay: Duration,
}

impl Dht22Reader {
    pub fn new(gpio: Option<u8>, config: &SensorConfig) -> Self {
        Self {
            gpio,
            device: config.iio_device.clone(),
            root: config.iio_root.clone(),
            retries: config.retries.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    async fn locate(&self) -> SensorResult<IioDevice> {
        match &self.device {
            Some(path) => IioDevice::open(path.clone()).await,
            None => {
                // The overlay names the node after the pin: dht11@<gpio in hex>.
                let unit = self.gpio.map(|pin| format!("{pin:x}"));
                IioDevice::discover(&self.root, DRIVERS, unit.as_deref()).await
            }
        }
    }

    fn channel(measurement: Measurement) -> &'static str {
        match measurement {
            Measurement::Humidity => "in_humidityrelative_input",
            _ => "in_temp_input",
        }
    }
}

#[async_trait::async_trait]
impl SensorReader for Dht22Reader {
    fn model(&self) -> SensorModel {
        SensorModel::Dht22
    }

    async fn read(&self) -> SensorResult<Sample> {
        let device = self.locate().await?;
        let expected = self.measurements();
        let mut sample = Sample::new();

        for attempt in 1..=self.retries {
            for measurement in sample.missing(expected) {
                match device.read_channel(Self::channel(measurement), -3).await {
                    Ok(value) => {
                        sample.insert(measurement, value);
                    }
                    Err(e) => debug!(attempt, %measurement, error = %e, "DHT22 read failed"),
                }
            }

            if sample.missing(expected).is_empty() {
                debug!(attempt, "DHT22 read complete");
                return Ok(sample);
            }
            if attempt < self.retries {
                tokio::time::sleep(self.delay).await;
            }
        }

        if sample.is_empty() {
            return Err(SensorError::NoData {
                attempts: self.retries,
            });
        }
        warn!(
            attempts = self.retries,
            missing = ?sample.missing(expected),
            "DHT22 returned a partial reading"
        );
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn config(root: &std::path::Path, retries: u32) -> SensorConfig {
        SensorConfig {
            iio_root: root.to_path_buf(),
            retries,
            retry_delay_ms: 0,
            ..Default::default()
        }
    }

    fn make_dht(root: &std::path::Path, node: &str) -> PathBuf {
        let dir = root.join("iio:device0");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("name"), "dht11\n").unwrap();
        std::os::unix::fs::symlink(format!("/sys/firmware/devicetree/base/{node}"), dir.join("of_node"))
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_reads_both_channels() {
        let root = tempfile::tempdir().unwrap();
        let dir = make_dht(root.path(), "dht11@11");
        fs::write(dir.join("in_temp_input"), "21049\n").unwrap();
        fs::write(dir.join("in_humidityrelative_input"), "55370\n").unwrap();

        // GPIO 17 is 0x11.
        let reader = Dht22Reader::new(Some(17), &config(root.path(), 3));
        let sample = reader.read().await.unwrap();
        assert_eq!(sample.get(Measurement::Temperature), Some(21.049));
        assert_eq!(sample.get(Measurement::Humidity), Some(55.37));
    }

    #[tokio::test]
    async fn test_partial_reading_after_retries() {
        let root = tempfile::tempdir().unwrap();
        let dir = make_dht(root.path(), "dht11@4");
        fs::write(dir.join("in_temp_input"), "19500\n").unwrap();

        let reader = Dht22Reader::new(Some(4), &config(root.path(), 2));
        let sample = reader.read().await.unwrap();
        assert_eq!(sample.get(Measurement::Temperature), Some(19.5));
        assert!(!sample.contains(Measurement::Humidity));
    }

    #[tokio::test]
    async fn test_no_data_after_retries() {
        let root = tempfile::tempdir().unwrap();
        make_dht(root.path(), "dht11@4");

        let reader = Dht22Reader::new(Some(4), &config(root.path(), 3));
        let err = reader.read().await.unwrap_err();
        assert!(matches!(err, SensorError::NoData { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_explicit_device_skips_discovery() {
        let root = tempfile::tempdir().unwrap();
        let dir = make_dht(root.path(), "dht11@4");
        fs::write(dir.join("in_temp_input"), "-2300\n").unwrap();
        fs::write(dir.join("in_humidityrelative_input"), "81000\n").unwrap();

        let config = SensorConfig {
            iio_device: Some(dir),
            iio_root: root.path().join("unused"),
            ..config(root.path(), 1)
        };
        let reader = Dht22Reader::new(None, &config);
        let sample = reader.read().await.unwrap();
        assert_eq!(sample.get(Measurement::Temperature), Some(-2.3));
        assert_eq!(sample.len(), 2);
    }
}
