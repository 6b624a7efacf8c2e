//! MQTT client builder.
//!
//! `ClientBuilder` turns a [`BrokerConfig`] into a `rumqttc` `AsyncClient` and
//! its `EventLoop`. The pair must be used together: the client queues
//! requests, the event loop writes them to the socket.
//!
//! ```ignore
//! let (client, event_loop) = ClientBuilder::new("raspi-garden", "localhost", 1883, 10)
//!     .credentials("user", "secret")
//!     .build()?;
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions};
use validator::Validate;

use super::{config::BrokerConfig, error::TransferError};

/// Builder for an MQTT client and event loop.
pub struct ClientBuilder {
    client_id: String,
    host: String,
    port: u16,

    /// Keep-alive interval sent in CONNECT
    keep_alive: Duration,

    /// Username and password, if the broker requires them
    credentials: Option<(String, String)>,

    /// Capacity of the request channel between client and event loop
    cap: usize,
}

impl ClientBuilder {
    /// Creates a builder with a 60 second keep-alive. Sessions are always
    /// clean.
    pub fn new(
        client_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        cap: usize,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            host: host.into(),
            port,
            keep_alive: Duration::from_secs(60),
            credentials: None,
            cap,
        }
    }

    /// Creates a builder from validated broker settings.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::ConfigError` if the configuration does not
    /// pass validation.
    pub fn from_config(config: &BrokerConfig) -> Result<Self, TransferError> {
        config.validate()?;

        let mut builder = Self::new(
            config.client_id.clone(),
            config.host.clone(),
            config.port,
            config.request_channel_capacity,
        )
        .keep_alive(config.keep_alive);

        if let Some((user, pass)) = config.credentials() {
            builder = builder.credentials(user, pass);
        }

        Ok(builder)
    }

    /// Sets the keep-alive interval in seconds.
    pub fn keep_alive(mut self, secs: u64) -> Self {
        self.keep_alive = Duration::from_secs(secs);
        self
    }

    /// Sets the CONNECT credentials.
    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Constructs the client and event loop. Nothing is sent until the event
    /// loop is polled.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::ClientSetup` for an unusable client id or a
    /// zero channel capacity.
    pub fn build(self) -> Result<(AsyncClient, EventLoop), TransferError> {
        if self.client_id.is_empty() || self.client_id.starts_with(char::is_whitespace) {
            return Err(TransferError::ClientSetup(format!(
                "invalid client id {:?}",
                self.client_id
            )));
        }
        if self.cap == 0 {
            return Err(TransferError::ClientSetup(
                "request channel capacity must be at least 1".into(),
            ));
        }

        let mut opts = MqttOptions::new(self.client_id, self.host, self.port);
        opts.set_keep_alive(self.keep_alive);
        if let Some((user, pass)) = self.credentials {
            opts.set_credentials(user, pass);
        }

        Ok(AsyncClient::new(opts, self.cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = ClientBuilder::new("test_client", "localhost", 1883, 10);
        assert_eq!(builder.cap, 10);
        assert_eq!(builder.keep_alive, Duration::from_secs(60));
        assert!(builder.credentials.is_none());
    }

    #[test]
    fn test_builder_with_chain_methods() {
        let builder = ClientBuilder::new("test_client", "localhost", 1883, 10)
            .keep_alive(30)
            .credentials("user", "pass");

        assert_eq!(builder.keep_alive, Duration::from_secs(30));
        assert_eq!(
            builder.credentials,
            Some(("user".to_string(), "pass".to_string()))
        );
    }

    #[test]
    fn test_from_config_applies_settings() {
        let mut config = BrokerConfig::new("pi", "broker.lan", 1884).with_credentials("u", "p");
        config.keep_alive = 15;
        let builder = ClientBuilder::from_config(&config).unwrap();
        assert_eq!(builder.host, "broker.lan");
        assert_eq!(builder.port, 1884);
        assert_eq!(builder.keep_alive, Duration::from_secs(15));
        assert_eq!(builder.credentials, Some(("u".to_string(), "p".to_string())));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = BrokerConfig::new("pi", "", 1883);
        assert!(matches!(
            ClientBuilder::from_config(&config),
            Err(TransferError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_build_tcp_client() {
        let result = ClientBuilder::new("test_client", "localhost", 1883, 10).build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_rejects_bad_client_id() {
        let result = ClientBuilder::new("", "localhost", 1883, 10).build();
        assert!(matches!(result, Err(TransferError::ClientSetup(_))));

        let result = ClientBuilder::new(" padded", "localhost", 1883, 10).build();
        assert!(matches!(result, Err(TransferError::ClientSetup(_))));
    }

    #[test]
    fn test_build_rejects_zero_capacity() {
        let result = ClientBuilder::new("test_client", "localhost", 1883, 0).build();
        assert!(matches!(result, Err(TransferError::ClientSetup(_))));
    }
}
