//! Error types shared by the grid engine.
//!
//! Failures fall into three classes:
//!
//! - [`GridError`]: structural failures that abort the running operation
//!   (duplicate or missing columns, empty input, malformed quoting, I/O).
//! - [`ColumnError`]: schema mistakes made by the caller. These are always
//!   fatal, even inside operations that otherwise tolerate bad rows.
//! - [`ConversionError`]: a single cell that could not be converted. Filter,
//!   process, and sort record these per row and keep going.

use std::io;

use thiserror::Error;

use crate::column::ColumnType;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ColumnError {
    #[error("Column '{0}' not found")]
    NotFound(String),
    #[error("No converter registered for column type '{0}'")]
    TypeUnsupported(ColumnType),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Failed to parse '{raw}' as {ty}: {reason}")]
pub struct ConversionError {
    pub raw: String,
    pub ty: ColumnType,
    pub reason: String,
}

impl ConversionError {
    pub fn new(raw: impl Into<String>, ty: ColumnType, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ty,
            reason: reason.into(),
        }
    }
}

/// Failure raised while reading one field through a [`crate::data::Data`] accessor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl FieldError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FieldError::Conversion(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unterminated quoted field starting in field {field}")]
    Unterminated { field: usize },
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("Dataset has no header row")]
    EmptyDataset,
    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("Malformed line {line}: {source}")]
    Format {
        line: usize,
        #[source]
        source: FormatError,
    },
    #[error("Row {0} does not exist")]
    RowNotFound(usize),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("Fetching {url}: {source}")]
    Remote {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} recorded {count} row error(s)")]
    RowErrors {
        operation: &'static str,
        count: usize,
    },
    #[error("{operation} failed at row {row}: {source}")]
    Operation {
        operation: &'static str,
        row: usize,
        #[source]
        source: Box<GridError>,
    },
}

impl GridError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        GridError::Io {
            context: context.into(),
            source,
        }
    }

    /// Attaches the operation name and row ordinal, keeping the innermost location.
    pub fn at(self, operation: &'static str, row: usize) -> Self {
        match self {
            already @ GridError::Operation { .. } => already,
            other => GridError::Operation {
                operation,
                row,
                source: Box::new(other),
            },
        }
    }

    /// Strips operation wrappers, returning the underlying failure.
    pub fn root(&self) -> &GridError {
        match self {
            GridError::Operation { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<FieldError> for GridError {
    fn from(err: FieldError) -> Self {
        match err {
            FieldError::Column(column) => GridError::Column(column),
            FieldError::Conversion(conversion) => GridError::Conversion(conversion),
        }
    }
}

pub type Result<T, E = GridError> = std::result::Result<T, E>;
