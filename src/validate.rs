//! Structural row validation.
//!
//! Every decoded row is checked before it enters the pipeline. Rows with
//! more values than header columns (overflow) or fewer (underflow) are
//! rejected with one diagnostic each and skipped; the run continues.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::model::{AccountField, Row};

/// Outcome of a structural check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowCheck {
    Ok,
    /// The line carried `extra` values beyond the declared columns.
    Overflow { extra: usize },
    /// The line had no value for these columns.
    Underflow { missing: Vec<AccountField> },
}

/// Classify a row.
#[must_use]
pub fn check(row: &Row) -> RowCheck {
    if !row.overflow().is_empty() {
        RowCheck::Overflow {
            extra: row.overflow().len(),
        }
    } else if !row.missing().is_empty() {
        RowCheck::Underflow {
            missing: row.missing().to_vec(),
        }
    } else {
        RowCheck::Ok
    }
}

/// A row excluded from processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejection {
    /// 1-based source line.
    pub line: u64,
    pub reason: String,
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {} {}. Skipping it.", self.line, self.reason)
    }
}

/// Applies [`check`] to a stream of rows and keeps the rejections.
#[derive(Debug, Default)]
pub struct Validator {
    rejected: Vec<RowRejection>,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass a well-formed row through; record and log anything else.
    pub fn admit(&mut self, line: u64, row: Row) -> Option<Row> {
        let reason = match check(&row) {
            RowCheck::Ok => return Some(row),
            RowCheck::Overflow { extra } => format!("has {extra} extra field(s)"),
            RowCheck::Underflow { missing } => {
                let names: Vec<&str> = missing.iter().map(AccountField::as_str).collect();
                format!("has too few fields (missing {})", names.join(", "))
            }
        };
        self.reject(line, reason);
        None
    }

    /// Record a rejection found after the structural check.
    pub fn reject(&mut self, line: u64, reason: impl Into<String>) {
        let rejection = RowRejection {
            line,
            reason: reason.into(),
        };
        warn!(line, "{rejection}");
        self.rejected.push(rejection);
    }

    #[must_use]
    pub fn rejected(&self) -> &[RowRejection] {
        &self.rejected
    }

    #[must_use]
    pub fn into_rejected(self) -> Vec<RowRejection> {
        self.rejected
    }
}
