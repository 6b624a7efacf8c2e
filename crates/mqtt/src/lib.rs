//! # raspi-sensor-mqtt-transport: one-shot MQTT publishing on top of `rumqttc`
//!
//! This crate owns everything that touches the broker for a single
//! sensor-to-broker publish run:
//!
//! - **Connection setup** from a validated [`BrokerConfig`] via [`ClientBuilder`]
//! - **A single bounded connect attempt** that reports the broker's own
//!   CONNACK code when the broker refuses the session
//! - **A scoped flush loop** ([`FlushLoop`]) that drives the `rumqttc` event
//!   loop only while messages are being handed over, and is torn down on every
//!   exit path
//! - **Status codes** ([`MqttStatus`], [`BrokerStatus`]) for connect failures,
//!   rejected publishes and disconnect results
//!
//! A run connects once, publishes a handful of QoS 0 messages and
//! disconnects. Reconnection and subscriptions are not handled here.
//!
//! # Lifecycle
//!
//! ```text
//! MqttTransport::new(&config)
//!        │
//!   connect() ──(CONNACK != 0 / network error)──> Err(BrokerStatus)
//!        │
//!   FlushLoop::start()  ── spawns event loop task
//!        │
//!   publish() × N       ── fire-and-forget, QoS 0
//!        │
//!   FlushLoop::stop()   ── cancels task, takes event loop back
//!        │
//!   disconnect()        ── writes pending publishes, then DISCONNECT
//! ```
//!
//! # Example
//!
//! ```ignore
//! use raspi_sensor_mqtt_transport::{BrokerConfig, FlushLoop, MqttTransport, Transport};
//!
//! let config = BrokerConfig::new("raspi-garden", "localhost", 1883);
//! let mut transport = MqttTransport::new(&config)?;
//! transport.connect().await?;
//!
//! let mut flush = FlushLoop::start(&mut transport);
//! flush.publish("garden/temperature", "21.5").await;
//! flush.stop().await;
//!
//! let status = transport.disconnect().await;
//! std::process::exit(status.code);
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod status;
pub mod transport;

pub use client::ClientBuilder;
pub use config::BrokerConfig;
pub use error::TransferError;
pub use session::MqttTransport;
pub use status::{BrokerStatus, MqttStatus};
pub use transport::{FlushLoop, PublishOutcome, Transport};

/// Result type for transport setup operations.
pub type Result<T> = std::result::Result<T, TransferError>;
