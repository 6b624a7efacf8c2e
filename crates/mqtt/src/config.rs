//! Broker connection settings.
//!
//! `BrokerConfig` is what the transport needs to open a single MQTT session.
//! Applications usually build it from their own configuration file format and
//! let [`ClientBuilder::from_config`](crate::ClientBuilder::from_config)
//! validate it.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// MQTT connection configuration for one publish run.
#[derive(Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_credentials"))]
pub struct BrokerConfig {
    /// Broker hostname or IP address.
    #[validate(length(
        min = 1,
        max = 255,
        message = "Host must be between 1 and 255 characters"
    ))]
    pub host: String,

    /// Broker port (1883 for plain MQTT).
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Client identifier presented in CONNECT. Required.
    #[validate(
        length(
            min = 1,
            max = 65535,
            message = "Client ID must be between 1 and 65535 bytes"
        ),
        custom(function = "validate_client_id")
    )]
    pub client_id: String,

    /// Username sent in CONNECT. Must be paired with `password`.
    pub username: Option<String>,

    /// Password sent in CONNECT. Must be paired with `username`.
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[validate(range(
        min = 5,
        max = 3600,
        message = "Keep alive must be between 5 and 3600 seconds"
    ))]
    pub keep_alive: u64,

    /// Upper bound, in seconds, for waiting on CONNACK and for flushing
    /// DISCONNECT.
    #[validate(range(
        min = 1,
        max = 300,
        message = "Connect timeout must be between 1 and 300 seconds"
    ))]
    pub connect_timeout: u64,

    /// Capacity of the client request channel.
    #[validate(range(
        min = 1,
        max = 255,
        message = "Request channel capacity must be between 1 and 255"
    ))]
    pub request_channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            host: "localhost".to_string(),
            port: 1883,
            client_id: String::new(),
            username: None,
            password: None,
            keep_alive: 60,
            connect_timeout: 10,
            request_channel_capacity: 10,
        }
    }
}

impl BrokerConfig {
    /// Creates a configuration with default timeouts.
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        BrokerConfig {
            client_id: client_id.into(),
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Sets username and password.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Returns the credential pair when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_channel_capacity", &self.request_channel_capacity)
            .finish()
    }
}

/// Username and password come as a pair.
fn validate_credentials(config: &BrokerConfig) -> Result<(), ValidationError> {
    if config.username.is_some() != config.password.is_some() {
        let mut err = ValidationError::new("incomplete_credentials");
        err.message = Some("Username and password must be set together".into());
        return Err(err);
    }
    Ok(())
}

/// `rumqttc` rejects client ids with leading whitespace.
fn validate_client_id(client_id: &str) -> Result<(), ValidationError> {
    if client_id.starts_with(char::is_whitespace) {
        let mut err = ValidationError::new("invalid_client_id");
        err.message = Some("Client ID must not start with whitespace".into());
        return Err(err);
    }
    Ok(())
}
