//! Remote record store.
//!
//! The sync engine only talks to the remote CRM through [`RecordStore`].
//! Paginated and chunked results are pulled one item at a time through
//! [`ChunkSource`], so a test double can serve deterministic fixtures.
//!
//! # Error classes
//!
//! - Per-record rejections (`create_record`, `delete_record`) come back as
//!   [`Error::RemoteRecord`](crate::error::Error::RemoteRecord) and are
//!   recorded by the caller.
//! - Authentication failures are [`Error::Connection`](crate::error::Error::Connection).
//! - Malformed queries are [`Error::Query`](crate::error::Error::Query).
//! - Job rejections are [`Error::RemoteJob`](crate::error::Error::RemoteJob).

pub mod salesforce;

#[cfg(test)]
pub(crate) mod mock;

use std::collections::BTreeMap;
use std::future::Future;

use serde::Serialize;

use crate::error::Result;

pub use salesforce::SalesforceStore;

/// One row of a SOQL query result, non-null scalars as text.
pub type QueryRow = BTreeMap<String, String>;

/// One page of a SOQL query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPage {
    /// Total rows matched by the query (same on every page).
    pub total_size: usize,
    pub rows: Vec<QueryRow>,
}

/// Per-job outcome of a bulk upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub processed: usize,
    pub failed: usize,
}

/// Body of one bulk upsert submission.
#[derive(Debug, Clone)]
pub struct UpsertPayload {
    /// Field the remote store matches existing records on.
    pub external_id_field: String,
    /// Complete delimited document, header included.
    pub csv: String,
    pub records: usize,
}

/// Pull-based sequence producer.
pub trait ChunkSource: Send {
    type Item;

    /// Fetch the next item; `None` once exhausted.
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Self::Item>>> + Send;
}

/// The remote CRM capabilities the engine needs.
pub trait RecordStore: Send + Sync {
    type Pages: ChunkSource<Item = QueryPage>;
    type Chunks: ChunkSource<Item = String>;

    /// Run a SOQL query. Pagination is handled by the returned source.
    fn query(&self, soql: &str) -> impl Future<Output = Result<Self::Pages>> + Send;

    /// Run a bulk query and stream its delimited-text result chunks.
    fn bulk_query(
        &self,
        soql: &str,
        max_records_per_chunk: usize,
    ) -> impl Future<Output = Result<Self::Chunks>> + Send;

    /// Submit a bulk upsert and wait for its per-job outcome.
    fn bulk_upsert(
        &self,
        payload: &UpsertPayload,
    ) -> impl Future<Output = Result<Vec<JobSummary>>> + Send;

    /// Delimited failure rows (with error reasons) for a finished job.
    fn fetch_failed_records(&self, job_id: &str) -> impl Future<Output = Result<String>> + Send;

    /// Create one record, returning its new id.
    fn create_record(
        &self,
        fields: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Delete one record by id.
    fn delete_record(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
}
