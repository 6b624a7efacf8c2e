//! Application configuration loading and validation.
//!
//! The configuration is a flat JSON object, loaded once per run and passed
//! explicitly to everything that needs it:
//!
//! ```json
//! {
//!     "mqtt_client_id": "raspi-garden",
//!     "mqtt_host": "broker.lan",
//!     "mqtt_user": "sensors",
//!     "mqtt_pass": "secret",
//!     "dht_gpio": 4,
//!     "topics": {
//!         "humidity": "garden/humidity",
//!         "temperature": "garden/temperature"
//!     }
//! }
//! ```
//!
//! Everything except `mqtt_client_id` and the topics has a default.

use std::{
    collections::BTreeMap,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use raspi_sensor_mqtt_transport::BrokerConfig;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use validator::{Validate, ValidationError};

use crate::core::{measurement::Measurement, sensors::SensorModel};

pub mod logger;
pub mod sensor;

use self::{
    logger::LoggerConfig,
    sensor::{PartialReadPolicy, SensorBackend, SensorConfig},
};

/// Severity of a line written before the tracing subscriber exists.
#[doc(hidden)]
#[derive(Debug, Clone, Copy)]
pub enum EarlyLevel {
    Info,
    Warn,
    Error,
}

/// Writes a timestamped line to stderr. Backs the `print_*` macros.
#[doc(hidden)]
pub fn early_log(level: EarlyLevel, args: fmt::Arguments<'_>) {
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let label = match level {
        EarlyLevel::Info => console::style("INFO").green(),
        EarlyLevel::Warn => console::style("WARN").yellow(),
        EarlyLevel::Error => console::style("ERROR").red(),
    };
    eprintln!("{}  {} {}", console::style(now).dim(), label, args);
}

/// Macros for printing timestamped messages before the tracing subscriber
/// is initialized. Used while the configuration is being loaded.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        $crate::config::early_log($crate::config::EarlyLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        $crate::config::early_log($crate::config::EarlyLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::config::early_log($crate::config::EarlyLevel::Error, format_args!($($arg)*))
    };
}

/// Errors that can occur while loading or checking the configuration. All of
/// them abort the run before any network or hardware I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("IO error while reading configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed JSON or a required key is absent.
    #[error("Parse error while reading configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// The selected sensor reports a measurement with no topic entry.
    #[error("No topic configured for measurement '{0}'")]
    MissingTopic(Measurement),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Run configuration.
#[derive(Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_credentials"))]
pub struct Config {
    /// Broker client identifier. Required.
    #[validate(length(
        min = 1,
        max = 65535,
        message = "mqtt_client_id must be between 1 and 65535 bytes"
    ))]
    pub mqtt_client_id: String,

    #[serde(default = "default_host")]
    #[validate(length(min = 1, max = 255, message = "mqtt_host must not be empty"))]
    pub mqtt_host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1, message = "mqtt_port must be between 1 and 65535"))]
    pub mqtt_port: u16,

    #[serde(default)]
    pub mqtt_user: Option<String>,

    #[serde(default)]
    pub mqtt_pass: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    #[validate(range(min = 5, max = 3600))]
    pub mqtt_keep_alive: u64,

    /// Bound in seconds for the connect handshake and the final flush.
    #[serde(default = "default_connect_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub mqtt_connect_timeout: u64,

    /// Measurement name to topic.
    #[serde(default)]
    #[validate(custom(function = "validate_topics"))]
    pub topics: BTreeMap<String, String>,

    /// BCM GPIO pin the DHT22 data line is wired to.
    #[serde(default)]
    #[validate(range(max = 53, message = "dht_gpio must be a BCM pin number (0-53)"))]
    pub dht_gpio: Option<u8>,

    #[serde(default)]
    #[validate(nested)]
    pub sensor: SensorConfig,

    #[serde(default)]
    pub partial_read: PartialReadPolicy,

    #[serde(default)]
    #[validate(nested)]
    pub logger: LoggerConfig,
}

// Hand-written so the broker password never reaches the logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mqtt_client_id", &self.mqtt_client_id)
            .field("mqtt_host", &self.mqtt_host)
            .field("mqtt_port", &self.mqtt_port)
            .field("mqtt_user", &self.mqtt_user)
            .field("mqtt_pass", &self.mqtt_pass.as_ref().map(|_| "<redacted>"))
            .field("mqtt_keep_alive", &self.mqtt_keep_alive)
            .field("mqtt_connect_timeout", &self.mqtt_connect_timeout)
            .field("topics", &self.topics)
            .field("dht_gpio", &self.dht_gpio)
            .field("sensor", &self.sensor)
            .field("partial_read", &self.partial_read)
            .field("logger", &self.logger)
            .finish()
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn validate_credentials(config: &Config) -> Result<(), ValidationError> {
    if config.mqtt_user.is_some() != config.mqtt_pass.is_some() {
        let mut err = ValidationError::new("incomplete_credentials");
        err.message = Some("mqtt_user and mqtt_pass must be set together".into());
        return Err(err);
    }
    Ok(())
}

fn validate_topics(topics: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    for (name, topic) in topics {
        if topic.is_empty() || topic.contains(['+', '#']) {
            let mut err = ValidationError::new("invalid_topic");
            err.message = Some(format!("Invalid topic for {}: {:?}", name, topic).into());
            return Err(err);
        }
    }
    Ok(())
}

impl Config {
    /// Resolves the command line path. Relative paths are taken relative to
    /// the directory holding the running executable, so a config file can
    /// sit next to the binary regardless of the working directory.
    pub fn resolve_path(path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }

        match std::env::current_exe() {
            Ok(exe) => match exe.parent() {
                Some(dir) => dir.join(path),
                None => path.to_path_buf(),
            },
            Err(e) => {
                print_warn!(
                    "Cannot locate executable ({}), using {} as given",
                    e,
                    path.display()
                );
                path.to_path_buf()
            }
        }
    }

    /// Loads and validates configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json_str(&config_str)
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` or `ConfigError::Validation`.
    pub fn from_json_str(json: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings a run of `model` depends on: a topic for every
    /// measurement the sensor reports, and a GPIO pin for DHT22 discovery.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingTopic` or `ConfigError::MissingField`.
    pub fn validate_for(&self, model: SensorModel) -> Result<(), ConfigError> {
        self.require_topics(model.measurements())?;

        if model == SensorModel::Dht22
            && self.sensor.backend == SensorBackend::Hardware
            && self.sensor.iio_device.is_none()
            && self.dht_gpio.is_none()
        {
            return Err(ConfigError::MissingField("dht_gpio"));
        }

        Ok(())
    }

    /// Fails on the first measurement without a topic.
    pub fn require_topics(&self, measurements: &[Measurement]) -> Result<(), ConfigError> {
        match measurements.iter().find(|m| self.topic_for(**m).is_none()) {
            Some(missing) => Err(ConfigError::MissingTopic(*missing)),
            None => Ok(()),
        }
    }

    pub fn topic_for(&self, measurement: Measurement) -> Option<&str> {
        self.topics.get(measurement.as_str()).map(String::as_str)
    }

    /// Broker settings for the transport.
    pub fn broker(&self) -> BrokerConfig {
        let mut broker = BrokerConfig::new(
            self.mqtt_client_id.clone(),
            self.mqtt_host.clone(),
            self.mqtt_port,
        );
        broker.username = self.mqtt_user.clone();
        broker.password = self.mqtt_pass.clone();
        broker.keep_alive = self.mqtt_keep_alive;
        broker.connect_timeout = self.mqtt_connect_timeout;
        broker
    }
}
