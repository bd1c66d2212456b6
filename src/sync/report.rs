//! Run reporting.
//!
//! The reporter accumulates per-batch counters and writes one line per
//! batch as it completes, plus a final aggregate line. Write failures are
//! logged and swallowed so they never mask the sync result.

use std::io::Write;

use colored::Colorize;
use serde::Serialize;
use tracing::warn;

use crate::sync::types::{BatchSummary, SyncRun, WorkflowKind};

/// Per-batch line of a [`RunSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchLine {
    pub index: usize,
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Aggregate counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rejected_rows: usize,
    pub warnings: usize,
    pub per_batch: Vec<BatchLine>,
}

/// Incremental reporter writing to `W`.
pub struct Reporter<W: Write> {
    sink: Option<W>,
    summary: RunSummary,
}

impl Reporter<std::io::Sink> {
    /// Reporter that only accumulates counters.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            sink: None,
            summary: RunSummary::default(),
        }
    }
}

impl<W: Write> Reporter<W> {
    #[must_use]
    pub fn new(sink: W) -> Self {
        Self {
            sink: Some(sink),
            summary: RunSummary::default(),
        }
    }

    /// Fold a completed batch into the counters and emit its line.
    pub fn record_batch(&mut self, batch: &BatchSummary) {
        let succeeded = batch.succeeded();
        self.summary.submitted += batch.submitted;
        self.summary.succeeded += succeeded;
        self.summary.failed += batch.failed;
        self.summary.warnings += batch.warnings;
        self.summary.per_batch.push(BatchLine {
            index: batch.index,
            submitted: batch.submitted,
            succeeded,
            failed: batch.failed,
        });

        let mut text = format!(
            "Batch {}: {} submitted, {} succeeded, {} failed",
            batch.index, batch.submitted, succeeded, batch.failed
        );
        if batch.dry_run {
            text.push_str(&format!(" {}", "(dry run)".dimmed()));
        }
        text.push('\n');
        for failure in &batch.failures {
            text.push_str(&format!(
                "  {} {}: {}\n",
                "✗".red(),
                failure.record,
                failure.error
            ));
        }
        self.emit(&text);
    }

    /// Emit the final aggregate line for `run`.
    pub fn finish(&mut self, run: &SyncRun) {
        self.summary.rejected_rows = run.rejected().len();

        let verb = match run.kind() {
            WorkflowKind::Export => "Export",
            WorkflowKind::Upsert => "Upsert",
            WorkflowKind::Create => "Import",
            WorkflowKind::DeleteAll => "Delete",
        };
        let status = if self.summary.failed > 0 || run.aborted() {
            "finished with failures".yellow().bold()
        } else {
            "complete".green().bold()
        };
        let mut text = format!(
            "{verb} {status}: {} submitted, {} succeeded, {} failed",
            self.summary.submitted, self.summary.succeeded, self.summary.failed
        );
        if self.summary.rejected_rows > 0 {
            text.push_str(&format!(", {} rows rejected", self.summary.rejected_rows));
        }
        if self.summary.warnings > 0 {
            text.push_str(&format!(", {} warnings", self.summary.warnings));
        }
        if run.aborted() {
            text.push_str(" (stopped at first error)");
        }
        text.push('\n');
        self.emit(&text);
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        self.summary.clone()
    }

    /// Release the sink.
    pub fn into_inner(self) -> Option<W> {
        self.sink
    }

    fn emit(&mut self, text: &str) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(e) = sink.write_all(text.as_bytes()).and_then(|()| sink.flush()) {
            warn!(error = %e, "report output failed; further report lines suppressed");
            self.sink = None;
        }
    }
}
