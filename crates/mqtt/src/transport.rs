//! The broker seam and the scoped flush loop.
//!
//! [`Transport`] is the small set of broker operations a publish run needs.
//! [`MqttTransport`](crate::MqttTransport) implements it over `rumqttc`; tests
//! implement it with an in-memory recorder.
//!
//! [`FlushLoop`] runs the transport's background network loop for as long as
//! it is alive. Calling [`FlushLoop::stop`] shuts the loop down gracefully.
//! Dropping the guard without stopping it (an early return, a `?`, a panic)
//! aborts the loop, so a run can never leave it running.

use async_trait::async_trait;
use tracing::debug;

use crate::status::BrokerStatus;

/// Result of handing one message to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The message was queued for delivery.
    Accepted,
    /// The transport refused the message.
    Rejected(BrokerStatus),
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PublishOutcome::Accepted)
    }

    /// Numeric status of the publish, `0` when accepted.
    pub fn code(&self) -> i32 {
        match self {
            PublishOutcome::Accepted => 0,
            PublishOutcome::Rejected(status) => status.code,
        }
    }
}

/// Broker operations used by a one-shot publish run.
#[async_trait]
pub trait Transport: Send {
    /// Opens the session. One attempt, no retries.
    ///
    /// # Errors
    ///
    /// Returns the refusal or network status when the session could not be
    /// established.
    async fn connect(&mut self) -> Result<(), BrokerStatus>;

    /// Starts the background network loop.
    fn start_loop(&mut self);

    /// Stops the background network loop and waits for it to finish.
    async fn stop_loop(&mut self);

    /// Stops the background network loop without waiting.
    fn abort_loop(&mut self);

    /// Queues a QoS 0, non-retained message.
    async fn publish(&mut self, topic: &str, payload: &str) -> PublishOutcome;

    /// Ends the session, flushing anything still queued first.
    async fn disconnect(&mut self) -> BrokerStatus;
}

/// Guard that keeps the transport's network loop running while it exists.
pub struct FlushLoop<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    running: bool,
}

impl<'a, T: Transport + ?Sized> FlushLoop<'a, T> {
    /// Starts the network loop on `transport`.
    pub fn start(transport: &'a mut T) -> Self {
        transport.start_loop();
        debug!("Flush loop started");
        Self {
            transport,
            running: true,
        }
    }

    /// Publishes through the running loop.
    pub async fn publish(&mut self, topic: &str, payload: &str) -> PublishOutcome {
        self.transport.publish(topic, payload).await
    }

    /// Stops the loop and releases the transport.
    pub async fn stop(mut self) {
        self.transport.stop_loop().await;
        self.running = false;
        debug!("Flush loop stopped");
    }
}

impl<T: Transport + ?Sized> Drop for FlushLoop<'_, T> {
    fn drop(&mut self) {
        if self.running {
            self.transport.abort_loop();
            debug!("Flush loop aborted");
        }
    }
}
