/// Append-only reading store.
///
/// Readings are written as CSV rows partitioned by capture day:
///
///   <root>/YYYY/MM/DD/<capture stamp>.csv
///
/// One container per gauge capture. Directories are created on demand; a
/// container that already exists is appended to only if its header matches,
/// so differently shaped data is never silently mixed.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::ResolvedReading;

/// Column order of every container.
pub const HEADERS: [&str; 5] = ["gauge", "type", "datetime", "level", "flow"];

const DATETIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%SUTC";
const CAPTURE_FORMAT: &str = "%Y-%m-%d_%H%M%SUTC";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{path} has header '{found}', expected '{expected}'")]
    ShapeMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

/// Flat row as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub gauge: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub datetime: String,
    pub level: f64,
    pub flow: Option<f64>,
}

impl From<&ResolvedReading> for StoreRecord {
    fn from(reading: &ResolvedReading) -> Self {
        StoreRecord {
            gauge: reading.gauge.clone(),
            kind: reading.kind.label().to_string(),
            datetime: reading.timestamp.format(DATETIME_FORMAT).to_string(),
            level: reading.level_ft,
            flow: reading.flow_kcfs,
        }
    }
}

/// Where a capture's rows go: day directory plus container name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub directory: PathBuf,
    pub container: String,
}

impl Partition {
    pub fn for_capture(capture: DateTime<Utc>) -> Self {
        Partition {
            directory: PathBuf::from(capture.format("%Y/%m/%d").to_string()),
            container: format!("{}.csv", capture.format(CAPTURE_FORMAT)),
        }
    }

    pub fn relative_path(&self) -> PathBuf {
        self.directory.join(&self.container)
    }
}

/// Capture stamps are whole seconds and strictly increasing, so no two
/// gauge captures share a container.
pub fn next_capture_stamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.with_nanosecond(0).unwrap_or(now);
    match previous {
        Some(prev) if now <= prev => prev + chrono::Duration::seconds(1),
        _ => now,
    }
}

pub trait ReadingStore {
    fn append(&mut self, partition: &Partition, record: &StoreRecord) -> Result<(), StoreError>;

    fn append_all(&mut self, partition: &Partition, records: &[StoreRecord]) -> Result<usize, StoreError> {
        for record in records {
            self.append(partition, record)?;
        }
        Ok(records.len())
    }
}

pub struct CsvReadingStore {
    root: PathBuf,
}

impl CsvReadingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CsvReadingStore { root: root.into() }
    }

    /// `true` if the container exists with content; errors on a foreign header.
    fn check_header(path: &Path) -> Result<bool, StoreError> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut first = String::new();
        BufReader::new(file)
            .read_line(&mut first)
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let found = first.trim_end();
        if found.is_empty() {
            return Ok(false);
        }

        let expected = HEADERS.join(",");
        if found != expected {
            return Err(StoreError::ShapeMismatch {
                path: path.to_path_buf(),
                expected,
                found: found.to_string(),
            });
        }
        Ok(true)
    }
}

impl ReadingStore for CsvReadingStore {
    fn append(&mut self, partition: &Partition, record: &StoreRecord) -> Result<(), StoreError> {
        let dir = self.root.join(&partition.directory);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(&partition.container);
        let has_header = Self::check_header(&path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        let csv_err = |source| StoreError::Csv {
            path: path.clone(),
            source,
        };
        let mut writer = csv::WriterBuilder::new()
            .has_headers(!has_header)
            .from_writer(file);
        writer.serialize(record).map_err(csv_err)?;
        writer.flush().map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }
}
