use std::path::PathBuf;

use thiserror::Error;

use crate::finops::accounts::cloudhealth::ApiError;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the fatal failure cases of the fetch, plan, and apply
/// phases. Per-item apply failures are not represented here; they are
/// reported as [`ApplyOutcome::Failed`](crate::model::ApplyOutcome::Failed).
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails outside the plan store.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when a CSV dataset cannot be read or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when a dataset header lacks a required column.
    #[error("dataset {dataset} is missing required column '{column}'")]
    MissingColumn {
        dataset: &'static str,
        column: &'static str,
    },

    /// Raised when two rows of one dataset share a primary key.
    #[error("duplicate {dataset} key '{key}' in rows {first_row} and {row}")]
    DuplicateKey {
        dataset: &'static str,
        key: String,
        first_row: usize,
        row: usize,
    },

    /// Raised when a plan item would be structurally invalid.
    #[error("invalid plan item for CloudHealth account {ch_id}: {reason}")]
    Validation { ch_id: String, reason: String },

    /// Raised when a persisted plan does not parse into the expected shape.
    #[error("corrupt plan {path}: {reason}")]
    CorruptPlan { path: String, reason: String },

    /// Raised when a CloudHealth call fails outside the apply loop.
    #[error("CloudHealth API error: {0}")]
    Api(#[from] ApiError),

    /// Raised when the HTTP client cannot be constructed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Raised when AWS Organizations enumeration fails.
    #[error("AWS Organizations error: {0}")]
    Aws(String),

    /// Raised when a dataset uses a spreadsheet layout the loader cannot read.
    #[error("unsupported dataset format: {0}")]
    UnsupportedFormat(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
