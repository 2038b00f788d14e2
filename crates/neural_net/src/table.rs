//! Minimal CSV ingestion
//!
//! Splits each line on a single comma with no quoting or escaping. The first
//! line is the header; every following non-blank line becomes a row. Row
//! widths are not checked here, the splitter decides what to do with them.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::errors::{Result, TrainerError};

pub const DELIMITER: char = ',';

/// Column-oriented view of a CSV file: headers plus string cells
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Read a table from any buffered reader.
    ///
    /// `origin` only names the source in error messages.
    pub fn from_reader<R: BufRead>(reader: R, origin: &str) -> Result<Self> {
        let mut headers = None;
        let mut rows = Vec::new();
        for (line_idx, line) in reader.lines().enumerate() {
            let line = read_line(line, line_idx + 1, origin)?;
            // `lines()` only ends records at "\n"; a bare "\r" ends one too
            for record in line.split('\r') {
                if headers.is_none() {
                    headers = Some(split_line(record));
                } else if !record.trim().is_empty() {
                    rows.push(split_line(record));
                }
            }
        }

        let headers = headers.ok_or_else(|| {
            TrainerError::Format(format!("'{}' is empty, expected a header line", origin))
        })?;
        Ok(Self { headers, rows })
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first header equal to `name`
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Load a table from a CSV file on disk
pub fn ingest<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| TrainerError::io(path, err))?;
    let table = Table::from_reader(BufReader::new(file), &path.display().to_string())?;

    tracing::info!(
        "Ingested {} rows x {} columns from {}",
        table.row_count(),
        table.column_count(),
        path.display()
    );
    Ok(table)
}

fn read_line(line: std::io::Result<String>, line_no: usize, origin: &str) -> Result<String> {
    match line {
        Ok(line) => Ok(line),
        Err(err) if err.kind() == std::io::ErrorKind::InvalidData => Err(TrainerError::Format(
            format!("'{}' line {}: not valid UTF-8", origin, line_no),
        )),
        Err(err) => Err(TrainerError::io(origin, err)),
    }
}

fn split_line(line: &str) -> Vec<String> {
    line.split(DELIMITER).map(|cell| cell.trim().to_string()).collect()
}
