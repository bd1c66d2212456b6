//! Batch planning.
//!
//! Pure partitioning of records into bounded, order-preserving batches.
//! This is independent of however the remote job API batches internally.

use crate::model::Record;
use crate::sync::types::Batch;

/// Default maximum records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Incremental planner: push records as they are decoded, take batches as
/// they fill.
#[derive(Debug)]
pub struct BatchPlanner {
    max: usize,
    next_index: usize,
    records: Vec<Record>,
    lines: Vec<u64>,
}

impl BatchPlanner {
    /// A `max` of zero is treated as one.
    #[must_use]
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            max,
            next_index: 1,
            records: Vec::with_capacity(max),
            lines: Vec::with_capacity(max),
        }
    }

    /// Add a record; returns a full batch once `max` is reached.
    pub fn push(&mut self, line: u64, record: Record) -> Option<Batch> {
        self.records.push(record);
        self.lines.push(line);
        (self.records.len() >= self.max).then(|| self.take())
    }

    /// Flush the final partial batch, if any.
    pub fn finish(mut self) -> Option<Batch> {
        (!self.records.is_empty()).then(|| self.take())
    }

    fn take(&mut self) -> Batch {
        let batch = Batch {
            index: self.next_index,
            records: std::mem::replace(&mut self.records, Vec::with_capacity(self.max)),
            lines: std::mem::replace(&mut self.lines, Vec::with_capacity(self.max)),
        };
        self.next_index += 1;
        batch
    }
}

/// Partition `records` into batches of at most `max`.
///
/// Empty input yields no batches. Line numbers are the 1-based input
/// positions.
#[must_use]
pub fn plan(records: impl IntoIterator<Item = Record>, max: usize) -> Vec<Batch> {
    let mut planner = BatchPlanner::new(max);
    let mut batches = Vec::new();
    for (i, record) in records.into_iter().enumerate() {
        batches.extend(planner.push(i as u64 + 1, record));
    }
    batches.extend(planner.finish());
    batches
}
