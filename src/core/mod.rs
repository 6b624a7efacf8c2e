//! Core runtime: measurements, sensor readers and the publish run.

pub mod measurement;
pub mod runner;
pub mod sensors;
