//! Row sources feeding the snapshot builder
//!
//! A row is a map of lower-cased field name to text value. A [`RowSource`]
//! hands out a lazy, finite iterator of rows; failing to open the source at
//! all is reported as [`GeoError::SourceUnavailable`], while a single bad row
//! is yielded as an `Err` item and counted by the builder.
//!
//! ```rust,no_run
//! use ipgeo::source::{CsvSource, RowSource};
//!
//! // .gz files are decompressed transparently
//! let rows = CsvSource::new("geoip.csv.gz").open()?;
//! for row in rows {
//!     println!("{:?}", row?.get("cidr"));
//! }
//! # Ok::<(), ipgeo::GeoError>(())
//! ```

use crate::error::GeoError;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, stdin, BufReader, Read};
use std::path::{Path, PathBuf};

/// One raw input row: lower-cased field name to text value
pub type Row = HashMap<String, String>;

/// Lazy row iterator returned by [`RowSource::open`]
pub type Rows = Box<dyn Iterator<Item = Result<Row, GeoError>> + Send>;

/// Buffer size for file reading (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

/// Producer of raw rows for a build
///
/// A row yielded as [`GeoError::SourceUnavailable`] means the stream itself
/// failed; the builder aborts on it. Any other `Err` row is one bad row.
pub trait RowSource {
    /// Open the source and return its rows
    fn open(&self) -> Result<Rows, GeoError>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Open a file with automatic gzip detection based on file extension
///
/// Files ending in `.gz` (case-insensitive) are decompressed. The path `-`
/// reads from stdin.
pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Read + Send>> {
    let path = path.as_ref();

    if path.to_str() == Some("-") {
        return Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, stdin())));
    }

    let file = File::open(path)?;

    let is_gzip = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if is_gzip {
        Ok(Box::new(BufReader::with_capacity(
            BUFFER_SIZE,
            GzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }
}

/// CSV file with a header row
///
/// Header names are lower-cased and fields are whitespace-trimmed. Rows
/// with fewer columns than the header are allowed; missing trailing fields
/// are simply absent from the row. The header must contain a `cidr` column.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    /// CSV source reading from `path` (`.gz` and `-` supported)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this source reads
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build rows from any reader producing CSV text
    pub fn rows_from_reader<R: Read + Send + 'static>(reader: R) -> Result<Rows, GeoError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| GeoError::SourceUnavailable(format!("failed to read CSV header: {}", e)))?
            .iter()
            .map(|h| h.to_lowercase())
            .collect();

        if !headers.iter().any(|h| h == "cidr") {
            return Err(GeoError::SourceUnavailable(format!(
                "required field 'cidr' not found in headers: {}",
                headers.join(", ")
            )));
        }

        // A failing stream truncates the source, so stop at its first error;
        // a bad record is one bad row
        let mut failed = false;
        let rows = csv_reader.into_records().map_while(move |result| {
            if failed {
                return None;
            }
            let row = match result {
                Ok(record) => Ok(headers
                    .iter()
                    .zip(record.iter())
                    .map(|(name, value)| (name.clone(), value.to_string()))
                    .collect::<Row>()),
                Err(e) if e.is_io_error() => {
                    failed = true;
                    Err(GeoError::SourceUnavailable(format!(
                        "read failed mid-stream: {}",
                        e
                    )))
                }
                Err(e) => Err(GeoError::Format(format!("bad CSV record: {}", e))),
            };
            Some(row)
        });

        Ok(Box::new(rows))
    }
}

impl RowSource for CsvSource {
    fn open(&self) -> Result<Rows, GeoError> {
        let reader = open_reader(&self.path).map_err(|e| {
            GeoError::SourceUnavailable(format!("failed to open {}: {}", self.path.display(), e))
        })?;
        Self::rows_from_reader(reader)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// In-memory rows, for embedding and tests
///
/// Field names are lower-cased on the way in.
#[derive(Debug, Clone, Default)]
pub struct IterSource {
    rows: Vec<Row>,
}

impl IterSource {
    /// Source yielding `rows` in order
    pub fn new<I, R, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
                        .collect()
                })
                .collect(),
        }
    }
}

impl RowSource for IterSource {
    fn open(&self) -> Result<Rows, GeoError> {
        Ok(Box::new(self.rows.clone().into_iter().map(Ok)))
    }

    fn describe(&self) -> String {
        format!("memory:{} rows", self.rows.len())
    }
}
