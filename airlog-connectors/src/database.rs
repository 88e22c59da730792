//! Document database sink
//!
//! Stores every record as one document in a MongoDB collection. The document
//! layout is fixed per sensor model:
//!
//! | Schema | Default collection | Fields |
//! |--------|--------------------|--------|
//! | `pce-aqd20` | `a_q_data` | timestamp, pm25, humidity, temperature, co2, pressure |
//! | `plantower` | `plantower_data` | timestamp, aqi, humidity, temperature, cpm25, cpm10, cpm100, apm25, apm10, apm100 |
//! | `xiaomi-mi` | `xiaomi_mi_data` | timestamp, temperature, humidity |
//!
//! `timestamp` and `aqi` are stored as 64-bit integers, the rest as doubles.
//! Missing or absent values become `null`, and record fields outside the schema
//! are left out. Units are not stored; they follow from the schema.
//!
//! Failure mapping:
//! - network, server selection or a retryable write label: `Retryable`
//! - anything else (authorization, validation, ...): `Fatal`

use airlog_core::errors::{ConfigError, SinkError};
use airlog_core::events::{fields, Record, TIMESTAMP_FIELD};
use airlog_core::sink::Sink;
use mongodb::bson::{Bson, Document};
use mongodb::error::{ErrorKind, RETRYABLE_WRITE_ERROR};
use serde::Deserialize;

use crate::ConnectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Int,
    Float,
}

use FieldKind::{Float, Int};

const AQ_DATA: &[(&str, FieldKind)] = &[
    (TIMESTAMP_FIELD, Int),
    (fields::PM25, Float),
    (fields::HUMIDITY, Float),
    (fields::TEMPERATURE, Float),
    (fields::CO2, Float),
    (fields::PRESSURE, Float),
];

const PLANTOWER_DATA: &[(&str, FieldKind)] = &[
    (TIMESTAMP_FIELD, Int),
    ("aqi", Int),
    (fields::HUMIDITY, Float),
    (fields::TEMPERATURE, Float),
    ("cpm25", Float),
    ("cpm10", Float),
    ("cpm100", Float),
    ("apm25", Float),
    ("apm10", Float),
    ("apm100", Float),
];

const XIAOMI_MI_DATA: &[(&str, FieldKind)] = &[
    (TIMESTAMP_FIELD, Int),
    (fields::TEMPERATURE, Float),
    (fields::HUMIDITY, Float),
];

/// Document layout, named after the sensor model it stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentSchema {
    PceAqd20,
    Plantower,
    XiaomiMi,
}

impl DocumentSchema {
    fn fields(self) -> &'static [(&'static str, FieldKind)] {
        match self {
            Self::PceAqd20 => AQ_DATA,
            Self::Plantower => PLANTOWER_DATA,
            Self::XiaomiMi => XIAOMI_MI_DATA,
        }
    }

    pub fn default_collection(self) -> &'static str {
        match self {
            Self::PceAqd20 => "a_q_data",
            Self::Plantower => "plantower_data",
            Self::XiaomiMi => "xiaomi_mi_data",
        }
    }

    pub fn field_names(self) -> impl Iterator<Item = &'static str> {
        self.fields().iter().map(|(name, _)| *name)
    }

    /// Map a record onto this schema
    pub fn document(self, record: &Record) -> Document {
        let mut document = Document::new();
        for &(name, kind) in self.fields() {
            let value = match (record.get(name).and_then(|m| m.value), kind) {
                (Some(v), Int) => Bson::Int64(v.round() as i64),
                (Some(v), Float) => Bson::Double(v),
                (None, _) => Bson::Null,
            };
            document.insert(name, value);
        }
        document
    }
}

/// Writer parameters of the `mongodb` sink
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSinkConfig {
    /// `mongodb://` or `mongodb+srv://` connection string
    #[serde(alias = "database_url")]
    pub uri: String,
    /// Falls back to the database named in the URI
    #[serde(default)]
    pub database: Option<String>,
    /// Falls back to the schema's default collection
    #[serde(default)]
    pub collection: Option<String>,
    pub schema: DocumentSchema,
}

/// Where documents end up
pub trait DocumentStore: Send {
    /// `database.collection`, used in logs
    fn namespace(&self) -> String;

    fn insert(&mut self, document: Document) -> Result<(), SinkError>;
}

/// Collection behind the blocking MongoDB client
pub struct MongoStore {
    collection: mongodb::sync::Collection<Document>,
}

impl MongoStore {
    /// Create the client; the server is not contacted until the first insert
    pub fn connect(config: &DatabaseSinkConfig) -> Result<Self, ConnectorError> {
        let client = mongodb::sync::Client::with_uri_str(&config.uri)?;
        let database = match &config.database {
            Some(name) => client.database(name),
            None => client.default_database().ok_or_else(|| {
                ConfigError::Invalid("mongodb sink needs a database, in the URI or as `database`".into())
            })?,
        };
        let collection = config
            .collection
            .as_deref()
            .unwrap_or_else(|| config.schema.default_collection());
        Ok(Self {
            collection: database.collection(collection),
        })
    }
}

fn sink_error(error: mongodb::error::Error) -> SinkError {
    let transient = error.contains_label(RETRYABLE_WRITE_ERROR)
        || matches!(*error.kind, ErrorKind::Io(_) | ErrorKind::ServerSelection { .. });
    if transient {
        SinkError::Retryable(error.to_string())
    } else {
        SinkError::Fatal(error.to_string())
    }
}

impl DocumentStore for MongoStore {
    fn namespace(&self) -> String {
        self.collection.namespace().to_string()
    }

    fn insert(&mut self, document: Document) -> Result<(), SinkError> {
        self.collection.insert_one(document).run().map_err(sink_error)?;
        Ok(())
    }
}

pub struct DatabaseSink<S: DocumentStore = MongoStore> {
    name: String,
    schema: DocumentSchema,
    store: S,
}

impl DatabaseSink<MongoStore> {
    pub fn connect(config: &DatabaseSinkConfig) -> Result<Self, ConnectorError> {
        let store = MongoStore::connect(config)?;
        log::info!("Initialized database sink for {}", store.namespace());
        Ok(Self::new(config.schema, store))
    }
}

impl<S: DocumentStore> DatabaseSink<S> {
    pub fn new(schema: DocumentSchema, store: S) -> Self {
        Self {
            name: format!("mongodb:{}", store.namespace()),
            schema,
            store,
        }
    }

    pub fn schema(&self) -> DocumentSchema {
        self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: DocumentStore> Sink for DatabaseSink<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn persist(&mut self, record: &Record) -> Result<(), SinkError> {
        let document = self.schema.document(record);
        log::debug!("Wrote to database: {}", document);
        self.store.insert(document)
    }
}

impl<S: DocumentStore> std::fmt::Debug for DatabaseSink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSink")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}
