//! The publish transaction: one connect, one sensor read, one publish per
//! measurement, one disconnect.
//!
//! ```text
//! Init -> ConfigLoaded -> BrokerConnected -> SensorRead -> Published -> Disconnected -> Terminal
//!              |                 |
//!              +-----------------+------> Terminal (config or connect failure)
//! ```
//!
//! A failed or partial sensor read does not stop the run: whatever was read
//! is published (or nothing, under [`PartialReadPolicy::RequireAll`]) and the
//! session is closed normally.

use std::fmt;

use raspi_sensor_mqtt_transport::{BrokerStatus, FlushLoop, PublishOutcome, Transport};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{
    measurement::{Measurement, Reading},
    sensors::{SensorModel, SensorReader},
};
use crate::config::{sensor::PartialReadPolicy, Config, ConfigError};

/// Exit status for a configuration problem (`EX_CONFIG`).
pub const EXIT_CONFIG: i32 = 78;

/// Exit status when the broker could not be reached or refused the session
/// (`EX_UNAVAILABLE`).
pub const EXIT_UNAVAILABLE: i32 = 69;

/// Exit status for a command line usage error (`EX_USAGE`).
pub const EXIT_USAGE: i32 = 64;

/// Stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    ConfigLoaded,
    BrokerConnected,
    SensorRead,
    Published,
    Disconnected,
    Terminal,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::ConfigLoaded => "config loaded",
            RunState::BrokerConnected => "broker connected",
            RunState::SensorRead => "sensor read",
            RunState::Published => "published",
            RunState::Disconnected => "disconnected",
            RunState::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// Failures that end a run before anything is published.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Connect was refused or failed. The sensor has not been read.
    #[error("Could not connect to MQTT broker! ({code}, {message})")]
    BrokerConnect { code: i32, message: String },
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Config(_) => EXIT_CONFIG,
            RunError::BrokerConnect { .. } => EXIT_UNAVAILABLE,
        }
    }
}

/// One attempted publish.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRecord {
    pub measurement: Measurement,
    pub topic: String,
    pub payload: String,
    pub outcome: PublishOutcome,
}

/// Outcome of a run that reached the publish step.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub model: SensorModel,
    pub publishes: Vec<PublishRecord>,
    pub disconnect: BrokerStatus,
}

impl RunReport {
    /// The disconnect status, verbatim. Failed publishes do not change it.
    pub fn exit_code(&self) -> i32 {
        self.disconnect.code
    }

    /// Number of publishes the transport accepted.
    pub fn accepted(&self) -> usize {
        self.publishes
            .iter()
            .filter(|p| p.outcome.is_success())
            .count()
    }
}

/// Runs the publish transaction against a sensor and a transport.
pub struct Runner<'a> {
    config: &'a Config,
    state: RunState,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            state: RunState::Init,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn advance(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "Run state");
        self.state = next;
    }

    /// Executes one run.
    ///
    /// # Errors
    ///
    /// `RunError::Config` when the configuration lacks something the sensor
    /// needs (checked before any broker call), `RunError::BrokerConnect` when
    /// the session could not be opened (the sensor is not read).
    pub async fn execute<S, T>(
        &mut self,
        sensor: &S,
        transport: &mut T,
    ) -> Result<RunReport, RunError>
    where
        S: SensorReader + ?Sized,
        T: Transport + ?Sized,
    {
        let model = sensor.model();

        if let Err(e) = self.config.validate_for(model) {
            error!(error = %e, "Configuration incomplete for {}", model);
            self.advance(RunState::Terminal);
            return Err(e.into());
        }
        self.advance(RunState::ConfigLoaded);

        if let Err(status) = transport.connect().await {
            error!(
                code = status.code,
                reason = %status.message,
                "Could not connect to MQTT broker"
            );
            self.advance(RunState::Terminal);
            return Err(RunError::BrokerConnect {
                code: status.code,
                message: status.message,
            });
        }
        self.advance(RunState::BrokerConnected);

        let readings = self.acquire(sensor).await;
        self.advance(RunState::SensorRead);

        let mut publishes = Vec::with_capacity(readings.len());
        let mut flush = FlushLoop::start(&mut *transport);
        for reading in &readings {
            let Some(topic) = self.config.topic_for(reading.measurement) else {
                continue;
            };
            let payload = reading.payload(model.precision());
            let outcome = flush.publish(topic, &payload).await;

            match &outcome {
                PublishOutcome::Accepted => {
                    info!(topic, %payload, "Published {}", reading.measurement)
                }
                PublishOutcome::Rejected(status) => warn!(
                    topic,
                    code = status.code,
                    reason = %status.message,
                    "Publish failed"
                ),
            }

            publishes.push(PublishRecord {
                measurement: reading.measurement,
                topic: topic.to_string(),
                payload,
                outcome,
            });
        }
        flush.stop().await;
        self.advance(RunState::Published);

        let disconnect = transport.disconnect().await;
        self.advance(RunState::Disconnected);
        if disconnect.is_success() {
            debug!("MQTT disconnect: {}", disconnect);
        } else {
            warn!(code = disconnect.code, reason = %disconnect.message, "MQTT disconnect failed");
        }

        self.advance(RunState::Terminal);
        Ok(RunReport {
            model,
            publishes,
            disconnect,
        })
    }

    /// Reads the sensor once and applies the partial read policy.
    async fn acquire<S: SensorReader + ?Sized>(&self, sensor: &S) -> Vec<Reading> {
        let expected = sensor.measurements();
        let sample = match sensor.read().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(sensor = %sensor.model(), error = %e, "Sensor read failed, nothing to publish");
                return Vec::new();
            }
        };

        let missing = sample.missing(expected);
        for measurement in &missing {
            warn!(sensor = %sensor.model(), %measurement, "Sensor did not produce a value");
        }
        if !missing.is_empty() && self.config.partial_read == PartialReadPolicy::RequireAll {
            warn!("Partial reading discarded, nothing will be published");
            return Vec::new();
        }

        expected
            .iter()
            .filter_map(|m| sample.get(*m).map(|value| Reading::new(*m, value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use raspi_sensor_mqtt_transport::MqttStatus;
    use tracing_test::traced_test;

    use super::*;
    use crate::core::sensors::stub::StubReader;

    /// Transport double recording every call.
    struct MockTransport {
        connect_result: Result<(), BrokerStatus>,
        disconnect_status: BrokerStatus,
        reject_topic: Option<String>,
        published: Vec<(String, String)>,
        calls: Vec<&'static str>,
        loop_running: bool,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                connect_result: Ok(()),
                disconnect_status: BrokerStatus::success(),
                reject_topic: None,
                published: Vec::new(),
                calls: Vec::new(),
                loop_running: false,
            }
        }

        fn refusing(code: i32, message: &str) -> Self {
            Self {
                connect_result: Err(BrokerStatus::new(code, message)),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&mut self) -> Result<(), BrokerStatus> {
            self.calls.push("connect");
            self.connect_result.clone()
        }

        fn start_loop(&mut self) {
            self.calls.push("start_loop");
            self.loop_running = true;
        }

        async fn stop_loop(&mut self) {
            self.calls.push("stop_loop");
            self.loop_running = false;
        }

        fn abort_loop(&mut self) {
            self.calls.push("abort_loop");
            self.loop_running = false;
        }

        async fn publish(&mut self, topic: &str, payload: &str) -> PublishOutcome {
            assert!(self.loop_running, "publish outside the flush loop");
            self.calls.push("publish");
            if self.reject_topic.as_deref() == Some(topic) {
                return PublishOutcome::Rejected(MqttStatus::QueueFull.into());
            }
            self.published.push((topic.to_string(), payload.to_string()));
            PublishOutcome::Accepted
        }

        async fn disconnect(&mut self) -> BrokerStatus {
            self.calls.push("disconnect");
            self.disconnect_status.clone()
        }
    }

    fn dht22_config(extra: &str) -> Config {
        Config::from_json_str(&format!(
            r#"{{
                "mqtt_client_id": "test",
                "sensor": {{"backend": "stub"}},
                "topics": {{"humidity": "home/humidity", "temperature": "home/temperature"}}
                {extra}
            }}"#
        ))
        .unwrap()
    }

    fn bmp180_config() -> Config {
        Config::from_json_str(
            r#"{
                "mqtt_client_id": "test",
                "sensor": {"backend": "stub"},
                "topics": {"temperature": "attic/temperature", "pressure": "attic/pressure"}
            }"#,
        )
        .unwrap()
    }

    fn published(transport: &MockTransport) -> Vec<(&str, &str)> {
        transport
            .published
            .iter()
            .map(|(t, p)| (t.as_str(), p.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn test_dht22_publishes_rounded_values() {
        let config = dht22_config("");
        let sensor = StubReader::new(
            SensorModel::Dht22,
            [
                (Measurement::Humidity, 55.37),
                (Measurement::Temperature, 21.049),
            ],
        );
        let mut transport = MockTransport::new();

        let mut runner = Runner::new(&config);
        let report = runner.execute(&sensor, &mut transport).await.unwrap();

        assert_eq!(
            published(&transport),
            vec![("home/humidity", "55.4"), ("home/temperature", "21.0")]
        );
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.accepted(), 2);
        assert_eq!(runner.state(), RunState::Terminal);
        assert_eq!(
            transport.calls,
            vec![
                "connect",
                "start_loop",
                "publish",
                "publish",
                "stop_loop",
                "disconnect"
            ]
        );
    }

    #[tokio::test]
    async fn test_bmp180_publishes_raw_values() {
        let config = bmp180_config();
        let sensor = StubReader::new(
            SensorModel::Bmp180,
            [
                (Measurement::Temperature, 21.37),
                (Measurement::Pressure, 100512.0),
            ],
        );
        let mut transport = MockTransport::new();

        let report = Runner::new(&config)
            .execute(&sensor, &mut transport)
            .await
            .unwrap();

        assert_eq!(
            published(&transport),
            vec![("attic/temperature", "21.37"), ("attic/pressure", "100512")]
        );
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_skips_sensor() {
        let config = dht22_config("");
        let sensor = StubReader::new(SensorModel::Dht22, [(Measurement::Humidity, 50.0)]);
        let mut transport = MockTransport::refusing(5, "Connection refused - not authorised");

        let mut runner = Runner::new(&config);
        let err = runner.execute(&sensor, &mut transport).await.unwrap_err();

        assert_eq!(sensor.read_count(), 0);
        assert!(matches!(err, RunError::BrokerConnect { code: 5, .. }));
        assert_ne!(err.exit_code(), 0);
        assert_eq!(transport.calls, vec!["connect"]);
        assert_eq!(runner.state(), RunState::Terminal);
    }

    #[tokio::test]
    async fn test_missing_topic_fails_before_connect() {
        let config = Config::from_json_str(
            r#"{"mqtt_client_id": "test", "sensor": {"backend": "stub"},
                "topics": {"humidity": "home/humidity"}}"#,
        )
        .unwrap();
        let sensor = StubReader::new(SensorModel::Dht22, [(Measurement::Humidity, 50.0)]);
        let mut transport = MockTransport::new();

        let err = Runner::new(&config)
            .execute(&sensor, &mut transport)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::Config(ConfigError::MissingTopic(Measurement::Temperature))
        ));
        assert_eq!(err.exit_code(), EXIT_CONFIG);
        assert!(transport.calls.is_empty());
        assert_eq!(sensor.read_count(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_partial_read_publishes_available_value() {
        let config = dht22_config("");
        let sensor = StubReader::new(SensorModel::Dht22, [(Measurement::Temperature, 19.96)]);
        let mut transport = MockTransport::new();

        let report = Runner::new(&config)
            .execute(&sensor, &mut transport)
            .await
            .unwrap();

        assert_eq!(published(&transport), vec![("home/temperature", "20.0")]);
        assert_eq!(report.exit_code(), 0);
        assert!(logs_contain("Sensor did not produce a value"));
    }

    #[tokio::test]
    async fn test_partial_read_with_require_all_publishes_nothing() {
        let config = dht22_config(r#", "partial_read": "require_all""#);
        let sensor = StubReader::new(SensorModel::Dht22, [(Measurement::Temperature, 19.96)]);
        let mut transport = MockTransport::new();

        let report = Runner::new(&config)
            .execute(&sensor, &mut transport)
            .await
            .unwrap();

        assert!(transport.published.is_empty());
        assert!(report.publishes.is_empty());
        assert_eq!(report.exit_code(), 0);
        assert!(transport.calls.contains(&"disconnect"));
    }

    #[tokio::test]
    async fn test_failed_sensor_still_disconnects() {
        let config = dht22_config("");
        let sensor = StubReader::new(SensorModel::Dht22, Vec::new());
        let mut transport = MockTransport::new();

        let report = Runner::new(&config)
            .execute(&sensor, &mut transport)
            .await
            .unwrap();

        assert_eq!(sensor.read_count(), 1);
        assert!(report.publishes.is_empty());
        assert_eq!(
            transport.calls,
            vec!["connect", "start_loop", "stop_loop", "disconnect"]
        );
    }

    #[tokio::test]
    async fn test_disconnect_code_passes_through() {
        let config = dht22_config("");
        let sensor = StubReader::new(
            SensorModel::Dht22,
            [(Measurement::Humidity, 40.0), (Measurement::Temperature, 20.0)],
        );
        let mut transport = MockTransport::new();
        transport.disconnect_status = MqttStatus::ConnectionLost.into();

        let report = Runner::new(&config)
            .execute(&sensor, &mut transport)
            .await
            .unwrap();

        assert_eq!(report.exit_code(), 7);
        assert_eq!(report.accepted(), 2);
    }

    #[tokio::test]
    async fn test_rejected_publish_does_not_change_exit_code() {
        let config = dht22_config("");
        let sensor = StubReader::new(
            SensorModel::Dht22,
            [(Measurement::Humidity, 40.0), (Measurement::Temperature, 20.0)],
        );
        let mut transport = MockTransport::new();
        transport.reject_topic = Some("home/humidity".into());

        let report = Runner::new(&config)
            .execute(&sensor, &mut transport)
            .await
            .unwrap();

        assert_eq!(report.accepted(), 1);
        assert_eq!(report.publishes[0].outcome.code(), MqttStatus::QueueFull.code());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_exit_codes_do_not_overlap_status_codes() {
        for code in [EXIT_USAGE, EXIT_UNAVAILABLE, EXIT_CONFIG] {
            assert_eq!(MqttStatus::from_code(code), None, "{code}");
        }
    }
}
