//! Sink registry
//!
//! Maps the `sink` name of a writer configuration to a constructor. Each
//! constructor deserializes its own parameter struct, so unknown or missing
//! parameters are reported against the sink that needs them.
//!
//! | Name | Sink |
//! |------|------|
//! | `file` | [`FileSink`] |
//! | `mqtt` | `MqttSink` (feature `mqtt`) |
//! | `mongodb` | `DatabaseSink` (feature `database`) |

use std::collections::BTreeMap;

use airlog_core::errors::ConfigError;
use airlog_core::sink::Sink;
use serde::de::DeserializeOwned;

use crate::config::SinkParams;
use crate::file::{FileSink, FileSinkConfig};
use crate::ConnectorError;

/// Builds a sink from its writer parameters
pub type SinkFactory = fn(&SinkParams) -> Result<Box<dyn Sink>, ConnectorError>;

/// Deserialize a sink's parameter struct from the writer entry
pub fn sink_params<T: DeserializeOwned>(params: &SinkParams) -> Result<T, ConnectorError> {
    Ok(serde_json::from_value(serde_json::Value::Object(params.clone()))?)
}

fn file(params: &SinkParams) -> Result<Box<dyn Sink>, ConnectorError> {
    let config: FileSinkConfig = sink_params(params)?;
    Ok(Box::new(FileSink::from_config(&config)?))
}

#[cfg(feature = "mqtt")]
fn mqtt(params: &SinkParams) -> Result<Box<dyn Sink>, ConnectorError> {
    let config: crate::mqtt::MqttSinkConfig = sink_params(params)?;
    Ok(Box::new(crate::mqtt::MqttSink::connect(&config)?))
}

#[cfg(feature = "database")]
fn mongodb(params: &SinkParams) -> Result<Box<dyn Sink>, ConnectorError> {
    let config: crate::database::DatabaseSinkConfig = sink_params(params)?;
    Ok(Box::new(crate::database::DatabaseSink::connect(&config)?))
}

#[derive(Clone)]
pub struct SinkRegistry {
    factories: BTreeMap<&'static str, SinkFactory>,
}

impl SinkRegistry {
    /// Registry without any sinks
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the bundled sinks
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("file", file);
        #[cfg(feature = "mqtt")]
        registry.register("mqtt", mqtt);
        #[cfg(feature = "database")]
        registry.register("mongodb", mongodb);
        registry
    }

    /// Add or replace a sink
    pub fn register(&mut self, name: &'static str, factory: SinkFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn create(&self, name: &str, params: &SinkParams) -> Result<Box<dyn Sink>, ConnectorError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownSink(name.to_string()))?;
        factory(params)
    }
}

impl std::fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlog_core::sink::MemorySink;
    use serde_json::json;

    fn params(value: serde_json::Value) -> SinkParams {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn unknown_sink() {
        let result = SinkRegistry::new().create("h5", &SinkParams::new());
        assert!(matches!(result, Err(ConnectorError::Config(ConfigError::UnknownSink(name))) if name == "h5"));
    }

    #[test]
    fn file_sink_from_params() {
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join("air.csv");
        let sink = SinkRegistry::new()
            .create("file", &params(json!({ "filename": filename })))
            .unwrap();
        assert_eq!(sink.name(), "file:air.csv");
    }

    #[test]
    fn sink_parameters_are_checked() {
        let registry = SinkRegistry::new();
        assert!(matches!(registry.create("file", &SinkParams::new()), Err(ConnectorError::Json(_))));
        assert!(matches!(
            registry.create("file", &params(json!({ "filename": "a.csv", "dataset_name": "air" }))),
            Err(ConnectorError::Json(_))
        ));
    }

    #[cfg(feature = "database")]
    #[test]
    fn mongodb_sink_parameters() {
        let registry = SinkRegistry::new();
        assert!(registry.contains("mongodb"));
        assert!(matches!(
            registry.create("mongodb", &params(json!({ "uri": "mongodb://localhost" }))),
            Err(ConnectorError::Json(_))
        ));
        // no database in the URI and none configured
        assert!(matches!(
            registry.create("mongodb", &params(json!({ "uri": "mongodb://localhost", "schema": "plantower" }))),
            Err(ConnectorError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn custom_sinks() {
        fn memory(_: &SinkParams) -> Result<Box<dyn Sink>, ConnectorError> {
            Ok(Box::new(MemorySink::new()))
        }

        let mut registry = SinkRegistry::empty();
        registry.register("memory", memory);
        assert!(registry.contains("memory"));
        assert!(!registry.contains("file"));
        assert_eq!(registry.create("memory", &SinkParams::new()).unwrap().name(), "memory");
    }
}
