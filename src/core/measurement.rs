//! Measured quantities and their published text form.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A physical quantity a sensor can report. The lowercase name is the key
/// used in the `topics` map of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measurement {
    /// Degrees Celsius.
    Temperature,
    /// Relative humidity in percent.
    Humidity,
    /// Pascal.
    Pressure,
}

impl Measurement {
    pub fn as_str(self) -> &'static str {
        match self {
            Measurement::Temperature => "temperature",
            Measurement::Humidity => "humidity",
            Measurement::Pressure => "pressure",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown measurement: {0}")]
pub struct UnknownMeasurement(pub String);

impl FromStr for Measurement {
    type Err = UnknownMeasurement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(Measurement::Temperature),
            "humidity" => Ok(Measurement::Humidity),
            "pressure" => Ok(Measurement::Pressure),
            other => Err(UnknownMeasurement(other.to_string())),
        }
    }
}

/// How a reading is rendered before publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Rounded half away from zero to one decimal place, always one digit
    /// after the point (`21.0`).
    OneDecimal,
    /// Shortest text that round-trips the driver value.
    Full,
}

/// One value produced by a sensor during this run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub measurement: Measurement,
    pub value: f64,
}

impl Reading {
    pub fn new(measurement: Measurement, value: f64) -> Self {
        Self { measurement, value }
    }

    /// Plain-text payload: no unit, no envelope.
    pub fn payload(&self, precision: Precision) -> String {
        match precision {
            // `{:.1}` rounds the exact binary value, ties to even.
            Precision::OneDecimal => format!("{:.1}", self.value),
            Precision::Full => self.value.to_string(),
        }
    }
}
