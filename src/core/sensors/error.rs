use thiserror::Error;

/// Errors raised while acquiring a sensor sample.
#[derive(Error, Debug)]
pub enum SensorError {
    /// No IIO device with a matching driver name was found.
    #[error("No IIO device for driver {drivers} under {root}")]
    DeviceNotFound { drivers: String, root: String },

    /// Failed to read a sysfs attribute.
    /// The kernel reports a failed bus transaction as an I/O error on read.
    #[error("Failed to read file {path}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An attribute did not contain a decimal number.
    #[error("Failed to parse {channel} from {location}: {reason}")]
    ParseError {
        channel: String,
        location: String,
        reason: String,
    },

    /// Every attempt failed.
    #[error("No reading after {attempts} attempt(s)")]
    NoData { attempts: u32 },
}
