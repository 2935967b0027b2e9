//! Error types for calendar loading and queries.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for calendar loading.
pub type CalendarResult<T> = Result<T, CalendarError>;

/// Errors that can occur while loading the calendar dataset.
///
/// All of these are fatal at startup: the server never runs on a partial table.
#[derive(Debug, Error)]
pub enum CalendarError {
    /// Failed to open or read the dataset file.
    #[error("Failed to read calendar file: {path}")]
    FileRead {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The delimited text could not be decoded.
    #[error("Malformed calendar data near line {line}")]
    Csv {
        /// 1-based line number reported by the reader.
        line: u64,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// The same date appears on more than one line.
    #[error("Duplicate date '{date}' on line {line}")]
    DuplicateDate {
        /// 1-based line number of the second occurrence.
        line: u64,
        /// The repeated date literal.
        date: String,
    },

    /// No usable day records were found.
    #[error("Calendar dataset contains no day records")]
    Empty,
}

impl CalendarError {
    /// Creates a file read error.
    pub fn file_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a CSV decoding error, taking the line from the error position.
    #[must_use]
    pub fn csv(source: csv::Error) -> Self {
        let line = source.position().map_or(0, csv::Position::line);
        Self::Csv { line, source }
    }
}

/// Errors raised by calendar queries.
///
/// These are scoped to a single request and never affect server state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The region string matches no known region or alias.
    #[error("Unknown region: {region}")]
    UnknownRegion {
        /// The region string as supplied by the caller.
        region: String,
    },
}

impl QueryError {
    /// Creates an unknown region error.
    pub fn unknown_region(region: impl Into<String>) -> Self {
        Self::UnknownRegion {
            region: region.into(),
        }
    }
}
