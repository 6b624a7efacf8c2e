//! Read a DHT22 sensor and publish humidity and temperature to MQTT.

use std::process;

use raspi_sensor_mqtt::{cli, core::sensors::SensorModel};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let code = cli::run(SensorModel::Dht22).await;
    process::exit(code);
}
