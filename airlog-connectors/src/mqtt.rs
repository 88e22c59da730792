//! MQTT sink
//!
//! Publishes every record as a JSON object to one topic. The `rumqttc` event
//! loop runs on its own thread and reconnects on its own; `persist` only
//! queues the publish request.
//!
//! Failure mapping:
//! - request queue full while the event loop is alive: `Retryable`
//! - event loop gone (client shut down): `Fatal`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use airlog_core::errors::{ConfigError, SinkError};
use airlog_core::events::Record;
use airlog_core::sink::Sink;
use rumqttc::{Client, Connection, ConnectionError, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;

use crate::ConnectorError;

pub const DEFAULT_PORT: u16 = 1883;

/// Pending publish requests before `persist` reports a retryable failure
const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

fn default_qos() -> u8 {
    1
}

fn default_keep_alive() -> u64 {
    30
}

/// Writer parameters of the `mqtt` sink
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MqttSinkConfig {
    /// `host`, `host:port` or `mqtt://host:port`
    pub broker_url: String,
    pub client_id: String,
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_s: u64,
}

/// Split a broker URL into host and port
pub fn parse_broker_url(url: &str) -> Result<(String, u16), ConfigError> {
    let address = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url)
        .trim_end_matches('/');

    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid port in broker URL {:?}", url)))?;
            (host, port)
        }
        None => (address, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(ConfigError::Invalid(format!("no host in broker URL {:?}", url)));
    }
    Ok((host.to_string(), port))
}

pub fn parse_qos(level: u8) -> Result<QoS, ConfigError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        _ => Err(ConfigError::Invalid(format!("MQTT QoS must be 0, 1 or 2, got {}", level))),
    }
}

pub struct MqttSink {
    name: String,
    topic: String,
    qos: QoS,
    client: Client,
    alive: Arc<AtomicBool>,
}

impl MqttSink {
    /// Create the client and start its event loop thread
    pub fn connect(config: &MqttSinkConfig) -> Result<Self, ConnectorError> {
        let (host, port) = parse_broker_url(&config.broker_url)?;
        let qos = parse_qos(config.qos)?;

        let mut options = MqttOptions::new(config.client_id.clone(), host.clone(), port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_s.max(5)));
        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }

        log::info!("Connecting to broker at {}:{}", host, port);
        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&alive);
        let label = format!("{}:{}", host, port);
        thread::Builder::new()
            .name(format!("mqtt-{}", config.client_id))
            .spawn(move || drive(connection, &label, &flag))?;

        Ok(Self {
            name: format!("mqtt:{}", config.topic),
            topic: config.topic.clone(),
            qos,
            client,
            alive,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

fn drive(mut connection: Connection, broker: &str, alive: &AtomicBool) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => log::debug!("Connected to MQTT broker {}", broker),
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => break,
            Err(e) => {
                log::error!("MQTT connection to {} failed: {}", broker, e);
                thread::sleep(RECONNECT_DELAY);
            }
        }
    }
    alive.store(false, Ordering::Release);
    log::info!("MQTT event loop for {} stopped", broker);
}

impl Sink for MqttSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn persist(&mut self, record: &Record) -> Result<(), SinkError> {
        if !self.is_alive() {
            return Err(SinkError::Fatal(format!("MQTT client for {} is disconnected", self.topic)));
        }
        let payload = serde_json::to_vec(record).map_err(|e| SinkError::Fatal(e.to_string()))?;

        match self.client.try_publish(self.topic.as_str(), self.qos, false, payload) {
            Ok(()) => {
                log::debug!("Send message to topic {}", self.topic);
                Ok(())
            }
            Err(e) if self.is_alive() => Err(SinkError::Retryable(e.to_string())),
            Err(e) => Err(SinkError::Fatal(e.to_string())),
        }
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            log::debug!("MQTT disconnect for {} not queued: {}", self.topic, e);
        }
    }
}

impl std::fmt::Debug for MqttSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSink")
            .field("topic", &self.topic)
            .field("qos", &self.qos)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_urls() {
        assert_eq!(parse_broker_url("broker.local").unwrap(), ("broker.local".to_string(), 1883));
        assert_eq!(parse_broker_url("broker.local:8883").unwrap(), ("broker.local".to_string(), 8883));
        assert_eq!(parse_broker_url("mqtt://10.0.0.2:1884/").unwrap(), ("10.0.0.2".to_string(), 1884));
        assert!(parse_broker_url("broker.local:mqtt").is_err());
        assert!(parse_broker_url(":1883").is_err());
    }

    #[test]
    fn qos_levels() {
        assert_eq!(parse_qos(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(parse_qos(2).unwrap(), QoS::ExactlyOnce);
        assert!(parse_qos(3).is_err());
    }

    #[test]
    fn config_defaults() {
        let config: MqttSinkConfig = serde_json::from_str(
            r#"{"broker_url": "broker.local", "client_id": "airlog", "topic": "lab/air", "username": "lab"}"#,
        )
        .unwrap();
        assert_eq!(config.qos, 1);
        assert_eq!(config.keep_alive_s, 30);
        assert_eq!(config.password, None);
    }

    #[test]
    fn publishes_are_queued_before_the_broker_answers() {
        let config: MqttSinkConfig = serde_json::from_str(
            r#"{"broker_url": "127.0.0.1:1", "client_id": "airlog-test", "topic": "lab/air"}"#,
        )
        .unwrap();
        let mut sink = MqttSink::connect(&config).unwrap();
        assert_eq!(sink.name(), "mqtt:lab/air");
        assert!(sink.persist(&Record::new()).is_ok());
    }
}
