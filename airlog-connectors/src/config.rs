//! Logger configuration
//!
//! One reader and one or more writers, loaded from JSON or YAML. The loader is
//! picked by file extension (`.json`, `.yaml`, `.yml`, case-insensitive).
//!
//! ```json
//! {
//!   "reader": { "model": "xiaomi-mi", "transport": "replay", "device": "mi.hex" },
//!   "writers": [
//!     { "sink": "file", "filename": "mi.csv",
//!       "filters": [ { "filter": "rule", "rules": [ { "field": "temperature", "min": -20 } ] } ] }
//!   ]
//! }
//! ```
//!
//! Every writer key other than `sink`, `window` and `filters` is handed to the
//! sink's constructor as a parameter.

use std::fs;
use std::path::Path;

use airlog_core::constants::DEFAULT_WINDOW_SIZE;
use airlog_core::decoder::SignCorrection;
use airlog_core::errors::ConfigError;
use airlog_core::reducer::WindowReducer;
use airlog_core::registry::ModelOptions;
use airlog_core::validators::{Filter, RateFilter, RuleFilter, ValidationRule};
use serde::Deserialize;

use crate::ConnectorError;

/// Sink parameters as written in the configuration
pub type SinkParams = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    #[default]
    Serial,
    Replay,
    /// Push source resolved through the notifier registry
    Notify,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReaderConfig {
    /// Sensor model name, resolved through the model registry
    pub model: String,
    #[serde(default)]
    pub transport: Transport,
    /// Serial port path, capture file or notifying device identifier
    pub device: String,
    /// Notification backend for the `notify` transport
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub baud_rate: Option<u32>,
    /// Overrides the model's read timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Overrides the model's frames per event
    #[serde(default)]
    pub frames_per_event: Option<usize>,
    #[serde(default)]
    pub sign_correction: Option<SignCorrection>,
}

impl ReaderConfig {
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            sign_correction: self.sign_correction.unwrap_or_default(),
        }
    }
}

fn default_window() -> usize {
    DEFAULT_WINDOW_SIZE
}

/// One entry of a writer's filter list
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "filter", rename_all = "snake_case", deny_unknown_fields)]
pub enum FilterConfig {
    Window {
        #[serde(default = "default_window")]
        size: usize,
    },
    Rule {
        rules: Vec<ValidationRule>,
    },
    Rate {
        field: String,
        max_rate_per_s: f64,
    },
}

impl FilterConfig {
    pub fn build(&self) -> Result<Box<dyn Filter>, ConfigError> {
        let filter: Box<dyn Filter> = match self {
            Self::Window { size } => Box::new(WindowReducer::new(*size)?),
            Self::Rule { rules } => Box::new(RuleFilter::new(rules.clone())),
            Self::Rate { field, max_rate_per_s } => {
                if !(max_rate_per_s.is_finite() && *max_rate_per_s > 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "rate limit for {} must be positive, got {}",
                        field, max_rate_per_s
                    )));
                }
                Box::new(RateFilter::new(field.clone(), *max_rate_per_s))
            }
        };
        Ok(filter)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WriterConfig {
    /// Sink name, resolved through the sink registry
    pub sink: String,
    /// Moving-average window in front of the filters
    #[serde(default)]
    pub window: Option<usize>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(flatten)]
    pub params: SinkParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(ConfigError::Invalid(format!(
                "there is no loader for extension {:?} of {}",
                ext,
                path.display()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    pub reader: ReaderConfig,
    pub writers: Vec<WriterConfig>,
}

impl LoggerConfig {
    /// Read and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConnectorError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let text = fs::read_to_string(path)?;
        log::debug!("Loading {:?} configuration from {}", format, path.display());
        Self::parse(&text, format)
    }

    pub fn parse(text: &str, format: ConfigFormat) -> Result<Self, ConnectorError> {
        let config: Self = match format {
            ConfigFormat::Json => serde_json::from_str(text)?,
            ConfigFormat::Yaml => serde_yaml::from_str(text)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.writers.is_empty() {
            return Err(ConfigError::Invalid("no writers configured".into()));
        }
        if self.reader.frames_per_event == Some(0) {
            return Err(ConfigError::Invalid("frames_per_event must be at least 1".into()));
        }
        Ok(())
    }
}
