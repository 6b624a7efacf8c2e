//! Sensor readers.
//!
//! Each supported sensor family has a hardware reader backed by the Linux IIO
//! sysfs interface. The stub reader returns configured values and is used
//! off-device and in tests. [`from_config`] picks one according to
//! `sensor.backend`.

use std::{collections::BTreeMap, fmt};

use super::measurement::{Measurement, Precision};
use crate::config::{sensor::SensorBackend, Config, ConfigError};

pub mod bmp180;
pub mod dht22;
pub mod error;
pub mod iio;
pub mod stub;
pub mod traits;
pub mod types;

pub use self::{error::SensorError, traits::SensorReader, types::SensorResult};

/// Supported sensor families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorModel {
    /// DHT22 / AM2302 humidity and temperature sensor.
    Dht22,
    /// BMP180 / BMP085 barometric pressure and temperature sensor.
    Bmp180,
}

impl SensorModel {
    /// Measurements the sensor reports, in publish order.
    pub fn measurements(self) -> &'static [Measurement] {
        match self {
            SensorModel::Dht22 => &[Measurement::Humidity, Measurement::Temperature],
            SensorModel::Bmp180 => &[Measurement::Temperature, Measurement::Pressure],
        }
    }

    pub fn precision(self) -> Precision {
        match self {
            SensorModel::Dht22 => Precision::OneDecimal,
            SensorModel::Bmp180 => Precision::Full,
        }
    }

    /// Name of the binary that serves this sensor.
    pub fn program_name(self) -> &'static str {
        match self {
            SensorModel::Dht22 => "dht22-mqtt",
            SensorModel::Bmp180 => "bmp180-mqtt",
        }
    }
}

impl fmt::Display for SensorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorModel::Dht22 => f.write_str("DHT22"),
            SensorModel::Bmp180 => f.write_str("BMP180"),
        }
    }
}

/// Values produced by one acquisition. A measurement that is absent could
/// not be read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    values: BTreeMap<Measurement, f64>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value. Non-finite values are dropped and count as missing.
    pub fn insert(&mut self, measurement: Measurement, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        self.values.insert(measurement, value);
        true
    }

    pub fn get(&self, measurement: Measurement) -> Option<f64> {
        self.values.get(&measurement).copied()
    }

    pub fn contains(&self, measurement: Measurement) -> bool {
        self.values.contains_key(&measurement)
    }

    /// Measurements from `expected` that have no value.
    pub fn missing(&self, expected: &[Measurement]) -> Vec<Measurement> {
        expected
            .iter()
            .copied()
            .filter(|m| !self.contains(*m))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(Measurement, f64)> for Sample {
    fn from_iter<I: IntoIterator<Item = (Measurement, f64)>>(iter: I) -> Self {
        let mut sample = Sample::new();
        for (measurement, value) in iter {
            sample.insert(measurement, value);
        }
        sample
    }
}

/// Builds the reader selected by the configuration.
///
/// # Errors
///
/// Returns `ConfigError::MissingField` when the DHT22 hardware reader has
/// neither a GPIO pin nor an explicit IIO device.
pub fn from_config(
    model: SensorModel,
    config: &Config,
) -> Result<Box<dyn SensorReader>, ConfigError> {
    let sensor = &config.sensor;
    let reader: Box<dyn SensorReader> = match (sensor.backend, model) {
        (SensorBackend::Stub, model) => {
            Box::new(stub::StubReader::new(model, sensor.stub_readings()))
        }
        (SensorBackend::Hardware, SensorModel::Dht22) => {
            if sensor.iio_device.is_none() && config.dht_gpio.is_none() {
                return Err(ConfigError::MissingField("dht_gpio"));
            }
            Box::new(dht22::Dht22Reader::new(config.dht_gpio, sensor))
        }
        (SensorBackend::Hardware, SensorModel::Bmp180) => {
            Box::new(bmp180::Bmp180Reader::new(sensor))
        }
    };
    Ok(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_measurements() {
        assert_eq!(
            SensorModel::Dht22.measurements(),
            &[Measurement::Humidity, Measurement::Temperature]
        );
        assert_eq!(SensorModel::Bmp180.precision(), Precision::Full);
        assert_eq!(SensorModel::Bmp180.program_name(), "bmp180-mqtt");
    }

    #[test]
    fn test_sample_drops_non_finite() {
        let mut sample = Sample::new();
        assert!(!sample.insert(Measurement::Temperature, f64::NAN));
        assert!(sample.insert(Measurement::Humidity, 40.0));
        assert_eq!(
            sample.missing(SensorModel::Dht22.measurements()),
            vec![Measurement::Temperature]
        );
    }

    #[test]
    fn test_from_config_stub_backend() {
        let config = Config::from_json_str(
            r#"{"mqtt_client_id": "a", "sensor": {"backend": "stub"}}"#,
        )
        .unwrap();
        let reader = from_config(SensorModel::Bmp180, &config).unwrap();
        assert_eq!(reader.model(), SensorModel::Bmp180);
    }

    #[test]
    fn test_from_config_dht22_hardware_needs_gpio() {
        let config = Config::from_json_str(r#"{"mqtt_client_id": "a"}"#).unwrap();
        assert!(matches!(
            from_config(SensorModel::Dht22, &config),
            Err(ConfigError::MissingField("dht_gpio"))
        ));

        let config = Config::from_json_str(r#"{"mqtt_client_id": "a", "dht_gpio": 4}"#).unwrap();
        assert_eq!(
            from_config(SensorModel::Dht22, &config).unwrap().model(),
            SensorModel::Dht22
        );
    }
}
