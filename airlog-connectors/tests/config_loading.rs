//! Loading configuration files from disk

mod common;

use airlog_connectors::config::{FilterConfig, LoggerConfig, Transport};
use airlog_connectors::{Broker, ConnectorError};
use airlog_core::errors::ConfigError;

use common::Workspace;

#[test]
fn yaml_file_builds_a_broker() {
    let ws = Workspace::new();
    let path = ws.write(
        "lab.yml",
        &format!(
            "reader:\n  model: plantower\n  transport: replay\n  device: capture.txt\n  timeout_ms: 10\n\
             writers:\n  - sink: file\n    filename: {}\n    filters:\n      - filter: window\n        size: 4\n",
            ws.path("lab.csv").display()
        ),
    );

    let config = LoggerConfig::load(&path).unwrap();
    assert_eq!(config.reader.transport, Transport::Replay);
    assert_eq!(config.reader.timeout_ms, Some(10));
    assert_eq!(config.writers[0].filters, vec![FilterConfig::Window { size: 4 }]);

    let broker = Broker::from_config(&config).unwrap();
    assert_eq!(broker.writers(), 1);
}

#[test]
fn json_and_yaml_agree() {
    let ws = Workspace::new();
    let json = ws.write(
        "a.json",
        r#"{"reader": {"model": "pce-aqd20", "device": "/dev/ttyUSB0", "baud_rate": 9600},
            "writers": [{"sink": "mqtt", "broker_url": "broker.local", "client_id": "lab", "topic": "air"}]}"#,
    );
    let yaml = ws.write(
        "a.yaml",
        "reader: {model: pce-aqd20, device: /dev/ttyUSB0, baud_rate: 9600}\n\
         writers:\n  - {sink: mqtt, broker_url: broker.local, client_id: lab, topic: air}\n",
    );

    let from_json = LoggerConfig::load(&json).unwrap();
    let from_yaml = LoggerConfig::load(&yaml).unwrap();
    assert_eq!(from_json, from_yaml);
    assert_eq!(from_json.reader.transport, Transport::Serial);
}

#[test]
fn unsupported_extension() {
    let ws = Workspace::new();
    let path = ws.write("lab.toml", "");
    assert!(matches!(
        LoggerConfig::load(&path),
        Err(ConnectorError::Config(ConfigError::Invalid(_)))
    ));
}

#[test]
fn missing_file() {
    let ws = Workspace::new();
    assert!(matches!(LoggerConfig::load(ws.path("absent.json")), Err(ConnectorError::Io(_))));
}

#[test]
fn unknown_sink_fails_at_startup() {
    let ws = Workspace::new();
    let path = ws.write(
        "lab.json",
        r#"{"reader": {"model": "plantower", "transport": "replay", "device": "capture.txt"},
            "writers": [{"sink": "influxdb", "database_url": "http://localhost:8086"}]}"#,
    );
    let config = LoggerConfig::load(&path).unwrap();
    assert!(matches!(
        Broker::from_config(&config),
        Err(ConnectorError::Config(ConfigError::UnknownSink(name))) if name == "influxdb"
    ));
}
