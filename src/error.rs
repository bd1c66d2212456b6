//! Error types for the account sync CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (3=config, 4=connection, 6=remote, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for `--json` consumers
//!
//! Only connection, query, and job-submission class errors unwind a run.
//! Row-level and record-level failures are recorded in the run's
//! bookkeeping instead of being propagated with `?`.

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Usage (exit 2, same status clap uses for argument errors)
    InvalidArgument,

    // Config (exit 3)
    ConfigError,

    // Connection (exit 4)
    ConnectionError,
    HttpError,

    // Row integrity (exit 5)
    SchemaMismatch,
    FieldFormatError,
    UndecodableRow,

    // Remote processing (exit 6)
    RemoteRecordError,
    RemoteJobError,
    PartialFailure,

    // Query (exit 7)
    QueryError,

    // I/O (exit 8)
    IoError,
    CsvError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::HttpError => "HTTP_ERROR",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::FieldFormatError => "FIELD_FORMAT_ERROR",
            Self::UndecodableRow => "UNDECODABLE_ROW",
            Self::RemoteRecordError => "REMOTE_RECORD_ERROR",
            Self::RemoteJobError => "REMOTE_JOB_ERROR",
            Self::PartialFailure => "PARTIAL_FAILURE",
            Self::QueryError => "QUERY_ERROR",
            Self::IoError => "IO_ERROR",
            Self::CsvError => "CSV_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    ///
    /// Config errors (3) stay distinct from usage errors (2).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::InvalidArgument => 2,
            Self::ConfigError => 3,
            Self::ConnectionError | Self::HttpError => 4,
            Self::SchemaMismatch | Self::FieldFormatError | Self::UndecodableRow => 5,
            Self::RemoteRecordError | Self::RemoteJobError | Self::PartialFailure => 6,
            Self::QueryError => 7,
            Self::IoError | Self::CsvError | Self::JsonError => 8,
        }
    }

    /// Whether the whole run must stop when this error is raised.
    ///
    /// Row and record class errors are recorded and skipped.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::SchemaMismatch
                | Self::FieldFormatError
                | Self::UndecodableRow
                | Self::RemoteRecordError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur while synchronizing records.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Schema mismatch at line {line}: {detail}")]
    SchemaMismatch { line: u64, detail: String },

    #[error("Invalid value '{value}' for field {field} at line {line}")]
    FieldFormat {
        line: u64,
        field: String,
        value: String,
    },

    #[error("Undecodable row at line {line}: {detail}")]
    Undecodable { line: u64, detail: String },

    #[error("Remote rejected record {record}: {message}")]
    RemoteRecord { record: String, message: String },

    #[error("Remote job for batch {batch} failed: {message}")]
    RemoteJob { batch: usize, message: String },

    #[error("{failed} of {submitted} records failed")]
    PartialFailure { failed: usize, submitted: usize },

    #[error("Query error: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Connection(_) => ErrorCode::ConnectionError,
            Self::Http(_) => ErrorCode::HttpError,
            Self::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            Self::FieldFormat { .. } => ErrorCode::FieldFormatError,
            Self::Undecodable { .. } => ErrorCode::UndecodableRow,
            Self::RemoteRecord { .. } => ErrorCode::RemoteRecordError,
            Self::RemoteJob { .. } => ErrorCode::RemoteJobError,
            Self::PartialFailure { .. } => ErrorCode::PartialFailure,
            Self::Query(_) => ErrorCode::QueryError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Csv(_) => ErrorCode::CsvError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Config(_) => Some(
                "Write a credential file like \
                 {\"sandbox\": {\"endpoint\": \"...\", \"token\": \"...\"}} \
                 to .creds.json, or set ACCTSYNC_ENDPOINT and ACCTSYNC_TOKEN."
                    .to_string(),
            ),
            Self::Connection(_) => Some(
                "The session token may have expired. \
                 Re-authenticate and update the credential file."
                    .to_string(),
            ),
            Self::SchemaMismatch { line: 1, .. } => Some(format!(
                "The header must list exactly these columns: {}",
                crate::model::AccountField::header().join(",")
            )),
            Self::RemoteJob { batch, .. } => Some(format!(
                "Batches before {batch} were already applied. \
                 Fix the data and re-run; upsert is idempotent."
            )),
            Self::PartialFailure { .. } => {
                Some("Per-record failure details are listed above each batch summary.".to_string())
            }
            Self::SchemaMismatch { .. }
            | Self::Http(_)
            | Self::FieldFormat { .. }
            | Self::Undecodable { .. }
            | Self::RemoteRecord { .. }
            | Self::Query(_)
            | Self::Io(_)
            | Self::Csv(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_exit_code_distinct_from_usage() {
        let config = Error::Config("missing".into());
        let usage = Error::InvalidArgument("missing path".into());
        assert_eq!(config.exit_code(), 3);
        assert_eq!(usage.exit_code(), 2);
    }

    #[test]
    fn test_row_errors_are_not_fatal() {
        assert!(!ErrorCode::SchemaMismatch.is_fatal());
        assert!(!ErrorCode::FieldFormatError.is_fatal());
        assert!(!ErrorCode::UndecodableRow.is_fatal());
        assert!(!ErrorCode::RemoteRecordError.is_fatal());
        assert!(ErrorCode::RemoteJobError.is_fatal());
        assert!(ErrorCode::ConnectionError.is_fatal());
    }

    #[test]
    fn test_structured_json() {
        let err = Error::RemoteJob {
            batch: 2,
            message: "InvalidBatch".into(),
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "REMOTE_JOB_ERROR");
        assert_eq!(json["error"]["exit_code"], 6);
        assert!(json["error"]["hint"].is_string());
    }

    #[test]
    fn test_header_hint_lists_columns() {
        let err = Error::SchemaMismatch {
            line: 1,
            detail: "unknown column Foo".into(),
        };
        let hint = err.hint().unwrap();
        assert!(hint.contains("AnnualRevenue"));
    }
}
