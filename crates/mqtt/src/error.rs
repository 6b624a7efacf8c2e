//! Error type for transport setup.
//!
//! Runtime broker failures (refused connect, rejected publish, failed
//! disconnect) are not errors in this sense: they are reported as
//! [`BrokerStatus`](crate::BrokerStatus) values because the caller turns them
//! into exit codes. `TransferError` covers what can go wrong before the first
//! packet is sent.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// The MQTT client could not be constructed.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// Broker settings failed validation.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),
}
