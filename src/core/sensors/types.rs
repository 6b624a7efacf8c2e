use super::error::SensorError;

/// Result type returned by sensor readers and the IIO helpers.
pub type SensorResult<T> = std::result::Result<T, SensorError>;
