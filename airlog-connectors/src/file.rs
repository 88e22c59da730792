//! File store sink
//!
//! Appends records to `<index>_<basename>` in the directory of the configured
//! filename, starting at index 1. When the current file cannot be written the
//! sink moves on to the next index and reports a retryable failure, so the
//! pipeline's retry lands in the fresh file.
//!
//! CSV files get a header row from the first record's field names; later
//! records are written in that column order, with empty cells for missing or
//! absent values. JSON Lines files hold one serialized record per line.
//!
//! The format follows the extension: `.csv`, or `.jsonl`/`.ndjson` for JSON
//! Lines. A plain `.json` name is refused because the output is not one JSON
//! document; set `format: json_lines` to keep such a name anyway.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use airlog_core::errors::{ConfigError, SinkError};
use airlog_core::events::Record;
use airlog_core::sink::Sink;
use serde::Deserialize;

use crate::ConnectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Csv,
    JsonLines,
}

impl FileFormat {
    /// Guess the format from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "jsonl" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Writer parameters of the `file` sink
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSinkConfig {
    pub filename: PathBuf,
    #[serde(default)]
    pub format: Option<FileFormat>,
}

#[derive(Debug)]
pub struct FileSink {
    name: String,
    directory: PathBuf,
    basename: String,
    format: FileFormat,
    index: u32,
    columns: Option<Vec<String>>,
}

impl FileSink {
    pub fn new(filename: impl AsRef<Path>, format: FileFormat) -> Result<Self, ConnectorError> {
        let filename = filename.as_ref();
        let basename = filename
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ConfigError::Invalid(format!("file sink needs a file name, got {}", filename.display())))?
            .to_string();
        let directory = filename.parent().map(Path::to_path_buf).unwrap_or_default();

        Ok(Self {
            name: format!("file:{}", basename),
            directory,
            basename,
            format,
            index: 1,
            columns: None,
        })
    }

    pub fn from_config(config: &FileSinkConfig) -> Result<Self, ConnectorError> {
        let format = match config.format {
            Some(format) => format,
            None => FileFormat::from_path(&config.filename).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "cannot tell file format of {}, use .csv, .jsonl or set format",
                    config.filename.display()
                ))
            })?,
        };
        Self::new(&config.filename, format)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// File the next record goes to
    pub fn current_path(&self) -> PathBuf {
        self.directory.join(format!("{}_{}", self.index, self.basename))
    }

    fn append(&mut self, path: &Path, record: &Record) -> Result<(), ConnectorError> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_new = file.metadata()?.len() == 0;
        if is_new {
            log::info!("Create new file {}", path.display());
        }

        match self.format {
            FileFormat::Csv => self.append_csv(file, is_new, record),
            FileFormat::JsonLines => {
                let mut line = serde_json::to_vec(record)?;
                line.push(b'\n');
                file.write_all(&line)?;
                Ok(())
            }
        }
    }

    fn append_csv(&mut self, file: File, is_new: bool, record: &Record) -> Result<(), ConnectorError> {
        let columns = self.columns.get_or_insert_with(|| record.keys().cloned().collect());
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(columns.iter())?;
        }
        let row = columns.iter().map(|column| {
            record
                .get(column)
                .and_then(|m| m.value)
                .map(|value| value.to_string())
                .unwrap_or_default()
        });
        writer.write_record(row)?;
        writer.flush()?;
        Ok(())
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn persist(&mut self, record: &Record) -> Result<(), SinkError> {
        let path = self.current_path();
        self.append(&path, record).map_err(|e| {
            self.index += 1;
            log::error!(
                "Problem accessing {}: {}. Writing in new file {}",
                path.display(),
                e,
                self.current_path().display()
            );
            SinkError::Retryable(e.to_string())
        })
    }
}
