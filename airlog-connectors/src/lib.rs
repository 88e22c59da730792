//! Transports, sinks and configuration for airlog
//!
//! ## Overview
//!
//! `airlog-core` decodes, validates and fans out sensor data without touching
//! hardware or storage. This crate supplies the outside world:
//!
//! | Concern | Module | Backed by |
//! |---------|--------|-----------|
//! | Serial transport | [`serial`] | `serialport` |
//! | Capture-file replay | [`replay`] | std I/O |
//! | Push sources | [`notify`] | std threads and channels |
//! | File store (CSV, JSON Lines) | [`file`] | `csv`, `serde_json` |
//! | Message broker | [`mqtt`] | `rumqttc` |
//! | Document database | [`database`] | `mongodb` |
//! | Configuration files | [`config`] | `serde_json`, `serde_yaml` |
//!
//! The [`broker::Broker`] ties them together: one reader, one device loop and
//! one sink pipeline per configured writer.
//!
//! ## Configuration
//!
//! ```yaml
//! reader:
//!   model: pce-aqd20
//!   transport: serial
//!   device: /dev/ttyUSB0
//!   baud_rate: 9600
//! writers:
//!   - sink: file
//!     filename: air.csv
//!     window: 30
//!   - sink: mqtt
//!     broker_url: broker.local:1883
//!     client_id: airlog-lab
//!     topic: lab/air
//!     filters:
//!       - filter: rate
//!         field: co2
//!         max_rate_per_s: 50.0
//!   - sink: mongodb
//!     uri: mongodb://localhost:27017/lab
//!     schema: pce-aqd20
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use airlog_connectors::{broker::Broker, config::LoggerConfig};
//!
//! let config = LoggerConfig::load("airlog.yaml")?;
//! let mut broker = Broker::from_config(&config)?;
//! broker.run_until(|| false)?;
//! # Ok::<(), airlog_connectors::ConnectorError>(())
//! ```

pub mod broker;
pub mod config;
pub mod file;
pub mod framer;
pub mod notify;
pub mod registry;
pub mod replay;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "database")]
pub mod database;

// Re-export common types
pub use broker::Broker;
pub use config::{FilterConfig, LoggerConfig, ReaderConfig, Transport, WriterConfig};
pub use file::{FileFormat, FileSink};
pub use notify::{CaptureNotifier, NotifierRegistry};
pub use registry::SinkRegistry;
pub use replay::ReplaySource;

#[cfg(feature = "serial")]
pub use serial::SerialSource;

#[cfg(feature = "mqtt")]
pub use mqtt::MqttSink;

#[cfg(feature = "database")]
pub use database::DatabaseSink;

use airlog_core::errors::{AcquisitionError, ConfigError};
use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "mqtt")]
    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Configuration error: {0}")]
    Config(ConfigError),

    #[error("Acquisition stopped: {0}")]
    Acquisition(AcquisitionError),
}

impl From<ConfigError> for ConnectorError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

impl From<AcquisitionError> for ConnectorError {
    fn from(error: AcquisitionError) -> Self {
        Self::Acquisition(error)
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_keep_their_message() {
        let err: ConnectorError = ConfigError::UnknownSink("h5".into()).into();
        assert_eq!(err.to_string(), "Configuration error: Unknown sink: h5");
    }
}
