//! Minimal access to Linux Industrial I/O devices through sysfs.
//!
//! Raspberry Pi OS exposes both supported sensors as IIO devices once the
//! matching device-tree overlay is loaded:
//!
//! ```text
//! /sys/bus/iio/devices/
//!   iio:device0/
//!     name                          <- driver name, e.g. "dht11"
//!     of_node -> .../dht11@4        <- device-tree node, unit address = GPIO
//!     in_temp_input                 <- milli-degrees Celsius
//!     in_humidityrelative_input     <- milli-percent
//! ```
//!
//! Reading a channel file triggers a measurement in the driver. A failed
//! measurement shows up as an I/O error on `read`.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::{error::SensorError, types::SensorResult};

/// An IIO device directory.
#[derive(Debug, Clone)]
pub struct IioDevice {
    path: PathBuf,
    name: String,
}

impl IioDevice {
    /// Opens a device directory directly.
    pub async fn open(path: impl Into<PathBuf>) -> SensorResult<Self> {
        let path = path.into();
        let name = read_attr(&path.join("name")).await?;
        Ok(Self { path, name })
    }

    /// Finds the device under `root` whose driver name is one of `drivers`.
    ///
    /// With `unit`, a device whose device-tree node has that unit address
    /// (`dht11@4` has unit `4`) is preferred. If no node matches but exactly
    /// one device has the right driver, that device is used.
    pub async fn discover(root: &Path, drivers: &[&str], unit: Option<&str>) -> SensorResult<Self> {
        let not_found = || SensorError::DeviceNotFound {
            drivers: drivers.join("|"),
            root: root.display().to_string(),
        };

        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(not_found())
            }
            Err(source) => {
                return Err(SensorError::FileRead {
                    path: root.display().to_string(),
                    source,
                })
            }
        };

        let mut dirs = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Ok(name) = entry.file_name().into_string() {
                if name.starts_with("iio:device") {
                    dirs.push(entry.path());
                }
            }
        }
        dirs.sort();

        let mut candidates = Vec::new();
        for dir in dirs {
            // Devices without a readable name are skipped.
            let Ok(name) = read_attr(&dir.join("name")).await else {
                continue;
            };
            if drivers.contains(&name.as_str()) {
                let node_unit = of_node_unit(&dir).await;
                trace!(device = %dir.display(), %name, unit = ?node_unit, "IIO candidate");
                candidates.push((Self { path: dir, name }, node_unit));
            }
        }

        if let Some(unit) = unit {
            if let Some(pos) = candidates
                .iter()
                .position(|(_, node)| node.as_deref() == Some(unit))
            {
                let (device, _) = candidates.swap_remove(pos);
                debug!(device = %device.path.display(), unit, "IIO device matched by unit address");
                return Ok(device);
            }
            if candidates.len() != 1 {
                return Err(not_found());
            }
        }

        match candidates.into_iter().next() {
            Some((device, _)) => {
                debug!(device = %device.path.display(), name = %device.name, "IIO device found");
                Ok(device)
            }
            None => Err(not_found()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads a channel and moves its decimal point by `exponent` places.
    /// `in_temp_input` is in milli-degrees, so `exponent` is -3 for degrees.
    pub async fn read_channel(&self, channel: &str, exponent: i32) -> SensorResult<f64> {
        let path = self.path.join(channel);
        let raw = read_attr(&path).await?;
        shift_decimal(&raw, exponent).ok_or_else(|| SensorError::ParseError {
            channel: channel.to_string(),
            location: path.display().to_string(),
            reason: format!("not a decimal number: {:?}", raw),
        })
    }
}

async fn read_attr(path: &Path) -> SensorResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map(|s| s.trim().to_string())
        .map_err(|source| SensorError::FileRead {
            path: path.display().to_string(),
            source,
        })
}

/// Unit address of the device-tree node behind `of_node`, in lowercase hex
/// as the kernel names it.
async fn of_node_unit(dir: &Path) -> Option<String> {
    let target = tokio::fs::read_link(dir.join("of_node")).await.ok()?;
    let node = target.file_name()?.to_str()?;
    node.split_once('@').map(|(_, unit)| unit.to_string())
}

/// Parses a decimal string and multiplies it by `10^exponent` by moving the
/// decimal point in the text, so that `("100.512", 3)` gives exactly
/// `100512.0`.
pub fn shift_decimal(raw: &str, exponent: i32) -> Option<f64> {
    let raw = raw.trim();
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", raw.strip_prefix('+').unwrap_or(raw)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !is_digits(int_part) || !is_digits(frac_part)
    {
        return None;
    }

    let all = format!("{int_part}{frac_part}");
    let point = int_part.len() as i64 + i64::from(exponent);

    let shifted = if point <= 0 {
        format!("0.{}{}", "0".repeat(point.unsigned_abs() as usize), all)
    } else if point as usize >= all.len() {
        format!("{}{}", all, "0".repeat(point as usize - all.len()))
    } else {
        let (whole, fraction) = all.split_at(point as usize);
        format!("{whole}.{fraction}")
    };

    format!("{sign}{shifted}").parse().ok()
}
