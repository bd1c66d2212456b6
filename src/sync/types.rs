//! Sync run bookkeeping types.
//!
//! A [`SyncRun`] is owned by the engine for the length of one workflow. It
//! collects one [`BatchSummary`] per completed batch plus the rows the
//! validator rejected, and is frozen once it reaches a terminal state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{FieldWarning, Record};
use crate::validate::RowRejection;

/// Which workflow a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Remote → local file.
    Export,
    /// Local file → remote via bulk upsert jobs.
    Upsert,
    /// Local file → remote via one create call per record.
    Create,
    /// Remove every remote record.
    DeleteAll,
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Export => write!(f, "export"),
            Self::Upsert => write!(f, "upsert"),
            Self::Create => write!(f, "create"),
            Self::DeleteAll => write!(f, "delete-all"),
        }
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Connecting,
    Streaming,
    AwaitingResults,
    Reporting,
    Done,
    Failed,
}

impl RunState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `self → next` is a legal step.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Done | Self::Failed, _) => false,
            (_, Self::Failed) => true,
            (Self::Connecting, Self::Streaming)
            | (Self::Streaming, Self::AwaitingResults | Self::Reporting)
            | (Self::AwaitingResults, Self::Streaming | Self::Reporting)
            | (Self::Reporting, Self::Done) => true,
            _ => false,
        }
    }
}

/// One failed record, as reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    /// Source line, when the failure maps back to the input file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    /// Record id or name.
    pub record: String,
    /// The API's error description.
    pub error: String,
    /// Submitted column values.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub row: BTreeMap<String, String>,
}

/// A bounded, ordered chunk of records submitted as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 1-based position within the run.
    pub index: usize,
    pub records: Vec<Record>,
    /// Source line of each record, parallel to `records`.
    pub lines: Vec<u64>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of a completed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub index: usize,
    /// Records sent (or rows written, for export).
    pub submitted: usize,
    /// Records the remote store processed.
    pub processed: usize,
    /// Records the remote store rejected.
    pub failed: usize,
    /// Remote job ids that handled this batch.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub job_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureDetail>,
    /// Non-fatal field warnings raised while preparing the batch.
    pub warnings: usize,
    /// True when the batch was planned but not sent (`--dry-run`).
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

impl BatchSummary {
    #[must_use]
    pub fn new(index: usize, submitted: usize) -> Self {
        Self {
            index,
            submitted,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn succeeded(&self) -> usize {
        self.processed.saturating_sub(self.failed)
    }
}

/// Top-level unit of work for one workflow.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    id: String,
    kind: WorkflowKind,
    state: RunState,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    batches: Vec<BatchSummary>,
    rejected: Vec<RowRejection>,
    warnings: Vec<FieldWarning>,
    aborted: bool,
}

impl SyncRun {
    #[must_use]
    pub fn new(kind: WorkflowKind) -> Self {
        Self {
            id: format!("run_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
            kind,
            state: RunState::Connecting,
            started_at: Utc::now(),
            finished_at: None,
            batches: Vec::new(),
            rejected: Vec::new(),
            warnings: Vec::new(),
            aborted: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn kind(&self) -> WorkflowKind {
        self.kind
    }

    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub fn batches(&self) -> &[BatchSummary] {
        &self.batches
    }

    #[must_use]
    pub fn rejected(&self) -> &[RowRejection] {
        &self.rejected
    }

    #[must_use]
    pub fn warnings(&self) -> &[FieldWarning] {
        &self.warnings
    }

    /// Whether the run stopped early under the abort-on-first-error policy.
    #[must_use]
    pub const fn aborted(&self) -> bool {
        self.aborted
    }

    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::Other(format!(
                "run {} is finalized ({:?})",
                self.id, self.state
            )));
        }
        Ok(())
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns an error for illegal transitions, including any change after
    /// the run reached `Done` or `Failed`.
    pub fn transition(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::Other(format!(
                "illegal run transition {:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record a completed batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is already finalized.
    pub fn push_batch(&mut self, batch: BatchSummary) -> Result<()> {
        self.ensure_open()?;
        self.batches.push(batch);
        Ok(())
    }

    /// Record rows excluded by validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is already finalized.
    pub fn extend_rejected(
        &mut self,
        rejected: impl IntoIterator<Item = RowRejection>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.rejected.extend(rejected);
        Ok(())
    }

    /// Record soft field warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is already finalized.
    pub fn extend_warnings(
        &mut self,
        warnings: impl IntoIterator<Item = FieldWarning>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.warnings.extend(warnings);
        Ok(())
    }

    /// Mark the run as stopped early.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is already finalized.
    pub fn mark_aborted(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.aborted = true;
        Ok(())
    }
}
