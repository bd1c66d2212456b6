//! Sync engine.
//!
//! Drives one workflow against a [`RecordStore`]:
//!
//! - **Export**: bulk query → chunk decoder → grouped rows → scoped file
//! - **Upsert**: file → validator → planner → one bulk upsert job per batch,
//!   with failure detail fetched for every batch that reports failures
//! - **Create**: file → validator → planner → one create call per record
//! - **Delete-all**: paginated id query → one delete call per record
//!
//! The pipeline is sequential and pull-based: the next chunk, page or batch
//! is not requested until the previous one has been fully handled. Per-row
//! and per-record problems are recorded on the run; connection, query and
//! job errors fail the run and are returned to the caller.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::model::{AccountField, FieldWarning, Operation, Record};
use crate::remote::{ChunkSource, RecordStore, UpsertPayload};
use crate::sync::codec::{
    ChunkDecoder, DecodedRow, RowDecoder, RowEncoder, encode_wire, parse_failed_results,
};
use crate::sync::file::ScopedOutput;
use crate::sync::planner::BatchPlanner;
use crate::sync::report::{Reporter, RunSummary};
use crate::sync::types::{Batch, BatchSummary, FailureDetail, RunState, SyncRun, WorkflowKind};
use crate::validate::{RowRejection, Validator};

/// A finished run and its aggregate counters.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run: SyncRun,
    pub summary: RunSummary,
}

impl RunOutcome {
    /// Whether any record failed or the run stopped early.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0 || self.run.aborted()
    }
}

/// Input file decoded, validated and planned one batch at a time.
struct PlannedInput<R: Read> {
    rows: RowDecoder<R>,
    validator: Validator,
    planner: Option<BatchPlanner>,
    op: Operation,
    warnings: Vec<FieldWarning>,
}

impl PlannedInput<BufReader<File>> {
    fn open(path: &Path, op: Operation, batch_size: usize) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file), op, batch_size)
    }
}

impl<R: Read> PlannedInput<R> {
    fn new(reader: R, op: Operation, batch_size: usize) -> Result<Self> {
        Ok(Self {
            rows: RowDecoder::new(reader)?,
            validator: Validator::new(),
            planner: Some(BatchPlanner::new(batch_size)),
            op,
            warnings: Vec::new(),
        })
    }

    /// Next full batch plus the field warnings raised while filling it.
    fn next_batch(&mut self) -> Result<Option<(Batch, Vec<FieldWarning>)>> {
        let Some(planner) = self.planner.as_mut() else {
            return Ok(None);
        };
        for decoded in self.rows.by_ref() {
            let DecodedRow { line, row } = match decoded {
                Ok(decoded) => decoded,
                Err(Error::Undecodable { line, detail }) => {
                    self.validator.reject(line, format!("could not be decoded ({detail})"));
                    continue;
                }
                Err(e) => return Err(e),
            };
            let Some(row) = self.validator.admit(line, row) else {
                continue;
            };
            match Record::parse_row(line, &row, self.op) {
                Ok((record, warnings)) => {
                    for warning in &warnings {
                        warn!(line, "{warning}");
                    }
                    self.warnings.extend(warnings);
                    if let Some(batch) = planner.push(line, record) {
                        return Ok(Some((batch, std::mem::take(&mut self.warnings))));
                    }
                }
                Err(Error::FieldFormat { field, .. }) => {
                    self.validator
                        .reject(line, format!("has no value for mandatory field {field}"));
                }
                Err(e) => self.validator.reject(line, e.to_string()),
            }
        }
        Ok(self
            .planner
            .take()
            .and_then(BatchPlanner::finish)
            .map(|batch| (batch, std::mem::take(&mut self.warnings))))
    }

    fn into_rejected(self) -> Vec<RowRejection> {
        self.validator.into_rejected()
    }
}

/// Source line of the batch record a failure row refers to.
///
/// Each record is matched at most once, so identical rows map to
/// successive lines.
fn locate_failure(batch: &Batch, detail: &FailureDetail, claimed: &mut [bool]) -> Option<u64> {
    let values: Vec<&str> = AccountField::ALL
        .iter()
        .map(|f| detail.row.get(f.as_str()).map_or("", String::as_str))
        .collect();
    let i = batch
        .records
        .iter()
        .enumerate()
        .position(|(i, record)| !claimed[i] && record.to_wire_values() == values)?;
    claimed[i] = true;
    Some(batch.lines[i])
}

fn remote_message(e: Error) -> String {
    match e {
        Error::RemoteRecord { message, .. } => message,
        other => other.to_string(),
    }
}

/// Orchestrates a single workflow.
pub struct SyncEngine<'a, S: RecordStore, W: Write> {
    store: &'a S,
    settings: &'a SyncSettings,
    reporter: Reporter<W>,
    dry_run: bool,
}

impl<'a, S: RecordStore, W: Write> SyncEngine<'a, S, W> {
    pub fn new(store: &'a S, settings: &'a SyncSettings, reporter: Reporter<W>) -> Self {
        Self {
            store,
            settings,
            reporter,
            dry_run: false,
        }
    }

    /// Decode, validate and plan without mutating the remote store.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Export every remote record to `output`.
    ///
    /// # Errors
    ///
    /// Returns `Query`/`Connection` for collaborator failures, `Io`/`Csv`
    /// for local write failures. The output file is only created on success.
    #[instrument(level = "info", skip_all, fields(output = %output.display()))]
    pub async fn export(mut self, output: &Path) -> Result<RunOutcome> {
        let mut run = SyncRun::new(WorkflowKind::Export);
        let result = self.run_export(&mut run, output).await;
        self.conclude(run, result)
    }

    /// Upsert the records in `input` through bulk jobs.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` for a bad header, `RemoteJob` when a batch's
    /// job is rejected, and `Connection`/`Http` for transport failures.
    /// Individual failed records are reported, not returned.
    #[instrument(level = "info", skip_all, fields(input = %input.display()))]
    pub async fn upsert(mut self, input: &Path) -> Result<RunOutcome> {
        let mut run = SyncRun::new(WorkflowKind::Upsert);
        let result = self.run_upsert(&mut run, input).await;
        self.conclude(run, result)
    }

    /// Create each record in `input` with one call per record.
    ///
    /// # Errors
    ///
    /// As for [`upsert`](Self::upsert); rejected records stop the run only
    /// under `abort_on_first_error`, and even then are reported, not returned.
    #[instrument(level = "info", skip_all, fields(input = %input.display()))]
    pub async fn create(mut self, input: &Path) -> Result<RunOutcome> {
        let mut run = SyncRun::new(WorkflowKind::Create);
        let result = self.run_create(&mut run, input).await;
        self.conclude(run, result)
    }

    /// Delete every remote record, attempting all of them.
    ///
    /// # Errors
    ///
    /// Returns `Query`/`Connection` for collaborator failures. Records that
    /// cannot be deleted are reported, not returned.
    #[instrument(level = "info", skip_all)]
    pub async fn delete_all(mut self) -> Result<RunOutcome> {
        let mut run = SyncRun::new(WorkflowKind::DeleteAll);
        let result = self.run_delete_all(&mut run).await;
        self.conclude(run, result)
    }

    fn conclude(mut self, mut run: SyncRun, result: Result<()>) -> Result<RunOutcome> {
        if let Err(e) = result {
            error!(run_id = run.id(), state = ?run.state(), error = %e, "run failed");
            // A run that is already terminal stays as it was.
            let _ = run.transition(RunState::Failed);
            return Err(e);
        }
        run.transition(RunState::Reporting)?;
        self.reporter.finish(&run);
        run.transition(RunState::Done)?;
        Ok(RunOutcome {
            summary: self.reporter.summary(),
            run,
        })
    }

    fn complete_batch(&mut self, run: &mut SyncRun, summary: BatchSummary) -> Result<()> {
        info!(
            batch = summary.index,
            submitted = summary.submitted,
            failed = summary.failed,
            "batch complete"
        );
        self.reporter.record_batch(&summary);
        run.push_batch(summary)
    }

    async fn run_export(&mut self, run: &mut SyncRun, output: &Path) -> Result<()> {
        let soql = format!(
            "SELECT {} FROM {}",
            AccountField::header().join(", "),
            self.settings.object
        );
        let mut chunks = self
            .store
            .bulk_query(&soql, self.settings.max_records_per_chunk)
            .await?;
        run.transition(RunState::Streaming)?;

        let mut encoder = RowEncoder::with_header(ScopedOutput::create(output)?)?;
        let mut decoder = ChunkDecoder::new();
        let mut index = 0;
        while let Some(chunk) = chunks.next_chunk().await? {
            index += 1;
            info!("Downloading batch {index}");

            let rows = decoder.decode_chunk(&chunk)?;
            let mut summary = BatchSummary::new(index, rows.len());
            let mut warnings = Vec::new();
            for DecodedRow { line, row } in rows {
                if !row.is_well_formed() {
                    debug!(line, "remote row does not match the header; writing known fields");
                }
                let (record, row_warnings) = Record::from_row_lenient(line, &row);
                for warning in &row_warnings {
                    warn!(line, "{warning}");
                }
                warnings.extend(row_warnings);
                encoder.write_row(&record.to_row())?;
                summary.processed += 1;
            }
            summary.warnings = warnings.len();
            run.extend_warnings(warnings)?;
            self.complete_batch(run, summary)?;
        }

        let rows = encoder.rows_written();
        let path = encoder.into_inner()?.commit()?;
        info!(path = %path.display(), rows, "export written");
        Ok(())
    }

    async fn run_upsert(&mut self, run: &mut SyncRun, input: &Path) -> Result<()> {
        let mut planned = PlannedInput::open(input, Operation::Upsert, self.settings.batch_size)?;
        run.transition(RunState::Streaming)?;

        while let Some((batch, warnings)) = planned.next_batch()? {
            let mut summary = BatchSummary::new(batch.index, batch.len());
            summary.warnings = warnings.len();
            run.extend_warnings(warnings)?;

            if self.dry_run {
                summary.dry_run = true;
            } else {
                run.transition(RunState::AwaitingResults)?;
                self.submit_upsert(&batch, &mut summary).await?;
                run.transition(RunState::Streaming)?;
            }
            self.complete_batch(run, summary)?;
        }

        run.extend_rejected(planned.into_rejected())
    }

    async fn submit_upsert(&self, batch: &Batch, summary: &mut BatchSummary) -> Result<()> {
        let payload = UpsertPayload {
            external_id_field: self.settings.external_id_field.clone(),
            csv: encode_wire(&batch.records)?,
            records: batch.len(),
        };
        let jobs = self
            .store
            .bulk_upsert(&payload)
            .await
            .map_err(|e| match e {
                Error::RemoteJob { message, .. } => Error::RemoteJob {
                    batch: batch.index,
                    message,
                },
                other => other,
            })?;

        for job in jobs {
            summary.processed += job.processed;
            summary.failed += job.failed;
            if job.failed > 0 {
                let details = self
                    .store
                    .fetch_failed_records(&job.job_id)
                    .await
                    .and_then(|text| parse_failed_results(&text));
                match details {
                    Ok(details) => summary.failures.extend(details),
                    Err(e) => warn!(job_id = %job.job_id, error = %e, "failure detail unavailable"),
                }
            }
            summary.job_ids.push(job.job_id);
        }

        let mut claimed = vec![false; batch.len()];
        for detail in &mut summary.failures {
            detail.line = locate_failure(batch, detail, &mut claimed);
            warn!(line = detail.line, record = %detail.record, "{}", detail.error);
        }
        Ok(())
    }

    async fn run_create(&mut self, run: &mut SyncRun, input: &Path) -> Result<()> {
        let mut planned = PlannedInput::open(input, Operation::Create, self.settings.batch_size)?;
        run.transition(RunState::Streaming)?;

        while let Some((batch, warnings)) = planned.next_batch()? {
            let mut summary = BatchSummary::new(batch.index, batch.len());
            summary.warnings = warnings.len();
            summary.dry_run = self.dry_run;
            run.extend_warnings(warnings)?;

            let mut attempted = 0;
            let mut stop = false;
            for (record, line) in batch.records.iter().zip(&batch.lines) {
                attempted += 1;
                let name = record.label();
                info!("Importing {name}");
                if self.dry_run {
                    continue;
                }

                let fields = record.to_wire_fields();
                match self.store.create_record(&fields).await {
                    Ok(id) => {
                        debug!(line, id = %id, "created");
                        summary.processed += 1;
                    }
                    Err(e) if !e.error_code().is_fatal() => {
                        let message = remote_message(e);
                        warn!(line, record = %name, "{message}");
                        summary.processed += 1;
                        summary.failed += 1;
                        summary.failures.push(FailureDetail {
                            line: Some(*line),
                            record: name,
                            error: message,
                            row: fields,
                        });
                        if self.settings.abort_on_first_error {
                            stop = true;
                            break;
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
            summary.submitted = attempted;
            self.complete_batch(run, summary)?;

            if stop {
                warn!("stopping at first failed record");
                run.mark_aborted()?;
                break;
            }
        }

        run.extend_rejected(planned.into_rejected())
    }

    async fn run_delete_all(&mut self, run: &mut SyncRun) -> Result<()> {
        let soql = format!("SELECT Id, AccountNumber, Name FROM {}", self.settings.object);
        let mut pages = self.store.query(&soql).await?;
        run.transition(RunState::Streaming)?;

        let mut index = 0;
        while let Some(page) = pages.next_chunk().await? {
            if index == 0 {
                info!("Found {} accounts", page.total_size);
            }
            index += 1;

            let mut summary = BatchSummary::new(index, page.rows.len());
            summary.dry_run = self.dry_run;
            for row in page.rows {
                let Some(id) = row.get(AccountField::Id.as_str()).filter(|id| !id.is_empty())
                else {
                    warn!(?row, "query row has no Id; skipping it");
                    continue;
                };
                if self.dry_run {
                    debug!(id = %id, "would delete");
                    continue;
                }

                match self.store.delete_record(id).await {
                    Ok(()) => summary.processed += 1,
                    Err(e) if !e.error_code().is_fatal() => {
                        let message = remote_message(e);
                        warn!("Unable to delete record {id} because {message}");
                        summary.processed += 1;
                        summary.failed += 1;
                        summary.failures.push(FailureDetail {
                            line: None,
                            record: id.clone(),
                            error: message,
                            row: row.clone(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            self.complete_batch(run, summary)?;
        }

        if index == 0 {
            info!("Found 0 accounts");
        }
        Ok(())
    }
}
