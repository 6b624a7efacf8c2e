//! Command line handling shared by the binaries.
//!
//! ```text
//! <program> <config.json>
//! <program> -h | --help
//! <program> --version
//! ```

use std::path::{Path, PathBuf};

use raspi_sensor_mqtt_transport::MqttTransport;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    config::Config,
    core::{
        runner::{Runner, EXIT_CONFIG, EXIT_USAGE},
        sensors::{self, SensorModel},
    },
    logger::LoggerManager,
    print_error, print_warn,
};

/// What the command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(PathBuf),
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("missing argument <config.json>")]
    MissingConfig,

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),

    #[error("unknown option '{0}'")]
    UnknownOption(String),
}

/// Parses the arguments that follow the program name.
pub fn parse_args<I, A>(args: I) -> Result<Command, UsageError>
where
    I: IntoIterator<Item = A>,
    A: Into<String>,
{
    let mut config = None;
    let mut options_done = false;
    for arg in args {
        let arg: String = arg.into();
        if !options_done && arg == "--" {
            options_done = true;
        } else if !options_done && (arg == "-h" || arg == "--help") {
            return Ok(Command::Help);
        } else if !options_done && arg == "--version" {
            return Ok(Command::Version);
        } else if !options_done && arg.len() > 1 && arg.starts_with('-') {
            return Err(UsageError::UnknownOption(arg));
        } else if config.is_some() {
            return Err(UsageError::UnexpectedArgument(arg));
        } else {
            config = Some(PathBuf::from(arg));
        }
    }
    config.map(Command::Run).ok_or(UsageError::MissingConfig)
}

pub fn usage(model: SensorModel) -> String {
    let name = model.program_name();
    format!(
        "{name} - Read {model} sensor and publish values to MQTT.\n\
         \n\
         Usage:\n  \
           {name} <config.json>\n  \
           {name} -h | --help\n  \
           {name} --version\n\
         \n\
         Arguments:\n  \
           config.json     Configuration file in JSON format. A relative path is\n                  \
                           resolved against the directory of the executable.\n\
         \n\
         Options:\n  \
           -h --help       Show this screen.\n  \
           --version       Show version.\n"
    )
}

pub fn version(model: SensorModel) -> String {
    format!("raspi-{} {}", model.program_name(), env!("CARGO_PKG_VERSION"))
}

/// Entry point for the binaries. Returns the process exit status.
pub async fn run(model: SensorModel) -> i32 {
    run_with_args(model, std::env::args().skip(1)).await
}

pub async fn run_with_args<I, A>(model: SensorModel, args: I) -> i32
where
    I: IntoIterator<Item = A>,
    A: Into<String>,
{
    match parse_args(args) {
        Ok(Command::Help) => {
            print!("{}", usage(model));
            0
        }
        Ok(Command::Version) => {
            println!("{}", version(model));
            0
        }
        Ok(Command::Run(path)) => execute(&Config::resolve_path(&path), model).await,
        Err(e) => {
            eprintln!("{}: {}\n\n{}", model.program_name(), e, usage(model));
            EXIT_USAGE
        }
    }
}

/// Loads the configuration at `path` and performs one publish run.
pub async fn execute(path: &Path, model: SensorModel) -> i32 {
    let config = match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            print_error!("{}", e);
            return EXIT_CONFIG;
        }
    };

    match LoggerManager::new(config.logger.clone()) {
        Ok(manager) => {
            if let Err(e) = manager.init() {
                print_warn!("Logging not initialized: {}", e);
            }
        }
        Err(e) => print_warn!("Logging not initialized: {}", e),
    }
    info!("Starting {} version {}", model.program_name(), env!("CARGO_PKG_VERSION"));
    debug!(?config, "Configuration loaded");

    let sensor = match sensors::from_config(model, &config) {
        Ok(sensor) => sensor,
        Err(e) => {
            error!("{}", e);
            return EXIT_CONFIG;
        }
    };

    let mut transport = match MqttTransport::new(&config.broker()) {
        Ok(transport) => transport,
        Err(e) => {
            error!("{}", e);
            return EXIT_CONFIG;
        }
    };

    match Runner::new(&config)
        .execute(sensor.as_ref(), &mut transport)
        .await
    {
        Ok(report) => {
            info!(
                published = report.accepted(),
                attempted = report.publishes.len(),
                status = %report.disconnect,
                "Run finished"
            );
            report.exit_code()
        }
        Err(e) => e.exit_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_path() {
        assert_eq!(
            parse_args(["config.json"]),
            Ok(Command::Run(PathBuf::from("config.json")))
        );
        assert_eq!(
            parse_args(["--", "-odd.json"]),
            Ok(Command::Run(PathBuf::from("-odd.json")))
        );
    }

    #[test]
    fn test_parse_flags() {
        assert_eq!(parse_args(["-h"]), Ok(Command::Help));
        assert_eq!(parse_args(["--help"]), Ok(Command::Help));
        assert_eq!(parse_args(["--version"]), Ok(Command::Version));
        assert_eq!(parse_args(["config.json", "--version"]), Ok(Command::Version));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_args(Vec::<String>::new()), Err(UsageError::MissingConfig));
        assert_eq!(
            parse_args(["--verbose"]),
            Err(UsageError::UnknownOption("--verbose".into()))
        );
        assert_eq!(
            parse_args(["a.json", "b.json"]),
            Err(UsageError::UnexpectedArgument("b.json".into()))
        );
    }

    #[test]
    fn test_usage_and_version() {
        assert!(usage(SensorModel::Dht22).contains("dht22-mqtt <config.json>"));
        assert!(usage(SensorModel::Bmp180).contains("Read BMP180 sensor"));
        assert!(version(SensorModel::Dht22).starts_with("raspi-dht22-mqtt "));
        assert_eq!(
            version(SensorModel::Bmp180),
            format!("raspi-bmp180-mqtt {}", env!("CARGO_PKG_VERSION"))
        );
    }
}
