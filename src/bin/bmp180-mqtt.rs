//! Read a BMP180 sensor and publish temperature and pressure to MQTT.

use std::process;

use raspi_sensor_mqtt::{cli, core::sensors::SensorModel};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let code = cli::run(SensorModel::Bmp180).await;
    process::exit(code);
}
