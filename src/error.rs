use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the failures that abort a run.
///
/// Row-level and period-level problems are not errors: they are collected as
/// [`Diagnostic`](crate::model::Diagnostic)s and reported next to the normal
/// output.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when a delimited file cannot be read.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when a workbook does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when a required column cannot be located in a source file.
    #[error("missing column '{column}' in {source_name}")]
    MissingColumn { source_name: String, column: String },

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Two roster rows normalise to the same name within one period.
    #[error(
        "duplicate roster entry for '{key}' in period {period}: '{first}' conflicts with '{second}'"
    )]
    DuplicateRosterEntry {
        key: String,
        period: String,
        first: String,
        second: String,
    },

    /// Raised when the run configuration is missing something the run needs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
