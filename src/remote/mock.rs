//! In-memory record store for engine tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use super::{ChunkSource, JobSummary, QueryPage, QueryRow, RecordStore, UpsertPayload};
use crate::error::{Error, Result};
use crate::model::AccountField;

const DELETE_FAILED: &str = "DELETE_FAILED: Your attempt to delete this account could not be \
     completed because it is associated with cases";

/// Number of calls made to each store method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub query: usize,
    pub bulk_query: usize,
    pub bulk_upsert: usize,
    pub fetch_failed_records: usize,
    pub create_record: usize,
    pub delete_record: usize,
}

/// A collaborator failure the mock can be told to raise.
#[derive(Debug, Clone)]
pub enum Outage {
    Query(String),
    Connection(String),
}

impl Outage {
    fn to_error(&self) -> Error {
        match self {
            Self::Query(message) => Error::Query(message.clone()),
            Self::Connection(message) => Error::Connection(message.clone()),
        }
    }
}

#[derive(Default)]
struct State {
    records: BTreeMap<String, BTreeMap<String, String>>,
    next_id: usize,
    next_job: usize,
    export_chunks: Option<Vec<String>>,
    page_size: usize,
    reject_names: BTreeSet<String>,
    fail_deletes: BTreeSet<String>,
    failed_results: BTreeMap<String, String>,
    job_failure: Option<String>,
    query_outage: Option<Outage>,
    chunk_outage: Option<(usize, Outage)>,
    calls: CallCounts,
}

impl State {
    fn new_id(&mut self) -> String {
        self.next_id += 1;
        format!("001M{:011}", self.next_id)
    }
}

/// Deterministic stand-in for the remote CRM.
pub struct MockStore {
    state: Mutex<State>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                page_size: 2,
                ..State::default()
            }),
        }
    }

    /// Seed existing accounts as `(id, name)` pairs.
    pub fn with_accounts<'a>(
        self,
        accounts: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for (id, name) in accounts {
                let mut fields = BTreeMap::new();
                fields.insert("Id".to_string(), id.to_string());
                fields.insert("Name".to_string(), name.to_string());
                state.records.insert(id.to_string(), fields);
            }
        }
        self
    }

    /// Serve these chunks from `bulk_query` instead of the stored records.
    pub fn with_chunks(self, chunks: Vec<String>) -> Self {
        self.state.lock().unwrap().export_chunks = Some(chunks);
        self
    }

    /// Reject any record with this name, in bulk and single-record paths.
    pub fn reject_name(self, name: &str) -> Self {
        self.state.lock().unwrap().reject_names.insert(name.to_string());
        self
    }

    pub fn fail_delete(self, id: &str) -> Self {
        self.state.lock().unwrap().fail_deletes.insert(id.to_string());
        self
    }

    /// Make every bulk upsert job end in `Failed`.
    pub fn fail_jobs(self, message: &str) -> Self {
        self.state.lock().unwrap().job_failure = Some(message.to_string());
        self
    }

    /// Make `query` and `bulk_query` fail before returning anything.
    pub fn fail_queries(self, outage: Outage) -> Self {
        self.state.lock().unwrap().query_outage = Some(outage);
        self
    }

    /// Let `bulk_query` deliver `chunks` chunks, then fail.
    pub fn fail_after_chunks(self, chunks: usize, outage: Outage) -> Self {
        self.state.lock().unwrap().chunk_outage = Some((chunks, outage));
        self
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn record(&self, id: &str) -> Option<BTreeMap<String, String>> {
        self.state.lock().unwrap().records.get(id).cloned()
    }
}

/// Fixture-backed chunk source, optionally failing once drained.
pub struct Fixture<T> {
    items: VecDeque<T>,
    then: Option<Outage>,
}

impl<T> Fixture<T> {
    fn new(items: VecDeque<T>) -> Self {
        Self { items, then: None }
    }
}

impl<T: Send> ChunkSource for Fixture<T> {
    type Item = T;

    async fn next_chunk(&mut self) -> Result<Option<T>> {
        match (self.items.pop_front(), self.then.take()) {
            (Some(item), then) => {
                self.then = then;
                Ok(Some(item))
            }
            (None, Some(outage)) => Err(outage.to_error()),
            (None, None) => Ok(None),
        }
    }
}

fn render_records(records: &BTreeMap<String, BTreeMap<String, String>>) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(AccountField::header()).unwrap();
    for fields in records.values() {
        writer
            .write_record(
                AccountField::ALL
                    .iter()
                    .map(|f| fields.get(f.as_str()).map_or("", String::as_str)),
            )
            .unwrap();
    }
    String::from_utf8(writer.into_inner().unwrap()).unwrap()
}

impl RecordStore for MockStore {
    type Pages = Fixture<QueryPage>;
    type Chunks = Fixture<String>;

    async fn query(&self, soql: &str) -> Result<Fixture<QueryPage>> {
        let mut state = self.state.lock().unwrap();
        state.calls.query += 1;
        if let Some(outage) = &state.query_outage {
            return Err(outage.to_error());
        }
        if !soql.starts_with("SELECT") {
            return Err(Error::Query(format!("MALFORMED_QUERY: {soql}")));
        }

        let rows: Vec<QueryRow> = state
            .records
            .values()
            .map(|fields| {
                fields
                    .iter()
                    .filter(|(k, _)| matches!(k.as_str(), "Id" | "Name" | "AccountNumber"))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .collect();
        let total_size = rows.len();
        let items = rows
            .chunks(state.page_size.max(1))
            .map(|page| QueryPage {
                total_size,
                rows: page.to_vec(),
            })
            .collect();
        Ok(Fixture::new(items))
    }

    async fn bulk_query(
        &self,
        _soql: &str,
        _max_records_per_chunk: usize,
    ) -> Result<Fixture<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.bulk_query += 1;
        if let Some(outage) = &state.query_outage {
            return Err(outage.to_error());
        }
        let items = match &state.export_chunks {
            Some(chunks) => chunks.iter().cloned().collect(),
            None => VecDeque::from([render_records(&state.records)]),
        };
        let mut fixture = Fixture::new(items);
        if let Some((chunks, outage)) = &state.chunk_outage {
            fixture.items.truncate(*chunks);
            fixture.then = Some(outage.clone());
        }
        Ok(fixture)
    }

    async fn bulk_upsert(&self, payload: &UpsertPayload) -> Result<Vec<JobSummary>> {
        let mut state = self.state.lock().unwrap();
        state.calls.bulk_upsert += 1;
        if let Some(message) = &state.job_failure {
            return Err(Error::RemoteJob {
                batch: 0,
                message: message.clone(),
            });
        }
        state.next_job += 1;
        let job_id = format!("750M{:011}", state.next_job);

        let mut reader = csv::Reader::from_reader(payload.csv.as_bytes());
        let headers = reader.headers().unwrap().clone();
        let mut failures = csv::Writer::from_writer(Vec::new());
        let mut failure_header = vec!["sf__Id", "sf__Error"];
        failure_header.extend(headers.iter());
        failures.write_record(&failure_header).unwrap();

        let mut processed = 0;
        let mut failed = 0;
        for result in reader.records() {
            let record = result.unwrap();
            processed += 1;
            let fields: BTreeMap<String, String> = headers
                .iter()
                .zip(record.iter())
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            let key = fields
                .get(&payload.external_id_field)
                .cloned()
                .unwrap_or_default();
            let name = fields.get("Name").cloned().unwrap_or_default();

            let error = if state.reject_names.contains(&name) {
                Some("DUPLICATE_VALUE:duplicate value found")
            } else if !key.is_empty() && !state.records.contains_key(&key) {
                Some("NOT_FOUND:Provided external ID field does not exist or is not accessible")
            } else {
                None
            };
            if let Some(error) = error {
                failed += 1;
                let mut line = vec![key.as_str(), error];
                line.extend(record.iter());
                failures.write_record(&line).unwrap();
                continue;
            }

            let id = if key.is_empty() { state.new_id() } else { key };
            let entry = state.records.entry(id.clone()).or_default();
            entry.extend(fields);
            entry.insert("Id".to_string(), id);
        }

        let text = String::from_utf8(failures.into_inner().unwrap()).unwrap();
        state.failed_results.insert(job_id.clone(), text);
        Ok(vec![JobSummary {
            job_id,
            processed,
            failed,
        }])
    }

    async fn fetch_failed_records(&self, job_id: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.fetch_failed_records += 1;
        state
            .failed_results
            .get(job_id)
            .cloned()
            .ok_or_else(|| Error::Http(format!("unknown job {job_id}")))
    }

    async fn create_record(&self, fields: &BTreeMap<String, String>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_record += 1;
        let name = fields.get("Name").cloned().unwrap_or_default();
        if state.reject_names.contains(&name) {
            return Err(Error::RemoteRecord {
                record: name,
                message: "DUPLICATE_VALUE: duplicate value found".to_string(),
            });
        }
        let id = state.new_id();
        let mut stored = fields.clone();
        stored.insert("Id".to_string(), id.clone());
        state.records.insert(id.clone(), stored);
        Ok(id)
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.delete_record += 1;
        if state.fail_deletes.contains(id) {
            return Err(Error::RemoteRecord {
                record: id.to_string(),
                message: DELETE_FAILED.to_string(),
            });
        }
        if state.records.remove(id).is_none() {
            return Err(Error::RemoteRecord {
                record: id.to_string(),
                message: "ENTITY_IS_DELETED: entity is deleted".to_string(),
            });
        }
        Ok(())
    }
}
