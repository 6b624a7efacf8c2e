//! raspi-sensor-mqtt - publish Raspberry Pi sensor readings to MQTT
//!
//! Each invocation of a binary is one transaction: load a JSON configuration
//! file, connect to the broker, read the sensor once, publish one plain-text
//! message per measurement and disconnect. Scheduling is left to cron or a
//! systemd timer.
//!
//! ## Binaries
//!
//! * `dht22-mqtt`: DHT22 / AM2302 humidity and temperature, rounded to 0.1
//! * `bmp180-mqtt`: BMP180 / BMP085 temperature and pressure, full precision
//!
//! ## Modules
//!
//! * `config`: JSON configuration, validation via the `validator` crate, and
//!   the `print_*` macros used before logging is set up.
//!
//! * `core`: Measurements, the `SensorReader` trait with IIO sysfs and stub
//!   backends, and the `Runner` that drives one publish transaction.
//!
//! * `logger`: `tracing` subscriber setup: console output on stderr in
//!   compact, pretty or JSON form, and optional systemd journald.
//!
//! * `cli`: Argument parsing and the exit status of a run.
//!
//! The broker side lives in the `raspi-sensor-mqtt-transport` workspace crate.

pub mod cli;
pub mod config;
pub mod core;
pub mod logger;
