//! Salesforce REST and Bulk API 2.0 record store.
//!
//! - `query` → `GET /query`, following `nextRecordsUrl`
//! - `bulk_query` → query job, polled, results read with `Sforce-Locator`
//! - `bulk_upsert` → one ingest job per submission (create, upload, close, poll)
//! - `fetch_failed_records` → `GET /jobs/ingest/{id}/failedResults/`
//! - `create_record` / `delete_record` → sObject endpoints

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::{ChunkSource, JobSummary, QueryPage, QueryRow, RecordStore, UpsertPayload};
use crate::config::{Credentials, SyncSettings};
use crate::error::{Error, Result};

/// Response header carrying the next bulk result locator.
const LOCATOR_HEADER: &str = "Sforce-Locator";

/// What kind of call failed, for error classification.
#[derive(Debug, Clone, Copy)]
enum Call<'a> {
    Query,
    Job,
    Record(&'a str),
}

impl fmt::Display for Call<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Job => write!(f, "bulk job"),
            Self::Record(id) => write!(f, "record {id}"),
        }
    }
}

/// Error body entry returned by the API.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

fn parse_api_error(body: &str) -> ApiError {
    if let Ok(mut errors) = serde_json::from_str::<Vec<ApiError>>(body) {
        if !errors.is_empty() {
            return errors.swap_remove(0);
        }
    }
    serde_json::from_str::<ApiError>(body).unwrap_or_else(|_| ApiError {
        error_code: String::new(),
        message: body.trim().to_string(),
    })
}

fn classify(status: StatusCode, body: &str, call: Call<'_>) -> Error {
    let api = parse_api_error(body);
    let message = if api.error_code.is_empty() {
        format!("{status}: {}", api.message)
    } else {
        format!("{}: {}", api.error_code, api.message)
    };

    if status == StatusCode::UNAUTHORIZED || api.error_code == "INVALID_SESSION_ID" {
        return Error::Connection(message);
    }
    match call {
        Call::Query if status == StatusCode::BAD_REQUEST => Error::Query(message),
        Call::Job if status.is_client_error() => Error::RemoteJob { batch: 0, message },
        Call::Record(record) if status.is_client_error() => Error::RemoteRecord {
            record: record.to_string(),
            message,
        },
        _ => Error::Http(format!("{call} failed with {message}")),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    total_size: usize,
    #[serde(default)]
    records: Vec<Map<String, Value>>,
    next_records_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobInfo {
    id: String,
    state: String,
    #[serde(default)]
    number_records_processed: usize,
    #[serde(default)]
    number_records_failed: usize,
    #[serde(default)]
    error_message: Option<String>,
}

impl JobInfo {
    fn failure_message(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| format!("job {} ended in state {}", self.id, self.state))
    }
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

fn row_from_json(record: Map<String, Value>) -> QueryRow {
    record
        .into_iter()
        .filter(|(key, _)| key != "attributes")
        .filter_map(|(key, value)| match value {
            Value::Null | Value::Object(_) | Value::Array(_) => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

/// Normalize a configured endpoint into an instance base URL.
#[must_use]
pub fn instance_url(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// HTTP-backed record store for one sObject type.
#[derive(Clone)]
pub struct SalesforceStore {
    client: Client,
    instance_url: String,
    token: String,
    api_version: String,
    object: String,
    poll_interval: Duration,
    max_poll_attempts: Option<u32>,
}

impl SalesforceStore {
    /// Build a store from resolved credentials and settings.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the HTTP client cannot be constructed.
    pub fn new(credentials: &Credentials, settings: &SyncSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("acctsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            instance_url: instance_url(&credentials.endpoint),
            token: credentials.token.clone(),
            api_version: settings.api_version.clone(),
            object: settings.object.clone(),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            max_poll_attempts: settings.max_poll_attempts,
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/services/data/v{}/{}",
            self.instance_url,
            self.api_version,
            path.trim_start_matches('/')
        )
    }

    async fn send(&self, request: RequestBuilder, call: Call<'_>) -> Result<Response> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    Error::Connection(format!("Could not reach {}: {e}", self.instance_url))
                } else {
                    Error::Http(format!("{call} request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, &body, call))
    }

    async fn fetch_query_page(&self, url: &str) -> Result<(QueryPage, Option<String>)> {
        debug!(url, "fetching query page");
        let response: QueryResponse = self
            .send(self.client.get(url), Call::Query)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format!("Failed to parse query response: {e}")))?;

        let next = response
            .next_records_url
            .map(|path| format!("{}{path}", self.instance_url));
        let page = QueryPage {
            total_size: response.total_size,
            rows: response.records.into_iter().map(row_from_json).collect(),
        };
        Ok((page, next))
    }

    async fn job_info(&self, kind: &str, id: &str, call: Call<'_>) -> Result<JobInfo> {
        self.send(self.client.get(self.data_url(&format!("jobs/{kind}/{id}"))), call)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format!("Failed to parse job status: {e}")))
    }

    /// Poll until the job reaches a terminal state.
    async fn wait_for_job(&self, kind: &str, id: &str, call: Call<'_>) -> Result<JobInfo> {
        let mut attempts = 0u32;
        loop {
            let info = self.job_info(kind, id, call).await?;
            if matches!(info.state.as_str(), "JobComplete" | "Failed" | "Aborted") {
                return Ok(info);
            }
            attempts += 1;
            if self.max_poll_attempts.is_some_and(|max| attempts >= max) {
                return Err(Error::RemoteJob {
                    batch: 0,
                    message: format!("job {id} still {} after {attempts} polls", info.state),
                });
            }
            debug!(job_id = id, state = %info.state, attempts, "waiting for job");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn abort_ingest(&self, id: &str) {
        let request = self
            .client
            .patch(self.data_url(&format!("jobs/ingest/{id}")))
            .json(&json!({ "state": "Aborted" }));
        if let Err(e) = self.send(request, Call::Job).await {
            warn!(job_id = id, error = %e, "failed to abort ingest job");
        }
    }

    async fn upload_and_close(&self, id: &str, csv: &str) -> Result<()> {
        let upload = self
            .client
            .put(self.data_url(&format!("jobs/ingest/{id}/batches")))
            .header(CONTENT_TYPE, "text/csv")
            .body(csv.to_string());
        self.send(upload, Call::Job).await?;

        let close = self
            .client
            .patch(self.data_url(&format!("jobs/ingest/{id}")))
            .json(&json!({ "state": "UploadComplete" }));
        self.send(close, Call::Job).await?;
        Ok(())
    }
}

/// Paginated SOQL results.
pub struct QueryPager {
    store: SalesforceStore,
    pending: Option<QueryPage>,
    next_url: Option<String>,
}

impl ChunkSource for QueryPager {
    type Item = QueryPage;

    async fn next_chunk(&mut self) -> Result<Option<QueryPage>> {
        if let Some(page) = self.pending.take() {
            return Ok(Some(page));
        }
        let Some(url) = self.next_url.take() else {
            return Ok(None);
        };
        let (page, next) = self.store.fetch_query_page(&url).await?;
        self.next_url = next;
        Ok(Some(page))
    }
}

/// Bulk query result chunks, read one locator at a time.
pub struct BulkResults {
    store: SalesforceStore,
    job_id: String,
    max_records: usize,
    locator: Option<String>,
    done: bool,
}

impl ChunkSource for BulkResults {
    type Item = String;

    async fn next_chunk(&mut self) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }
        let mut request = self
            .store
            .client
            .get(self.store.data_url(&format!("jobs/query/{}/results", self.job_id)))
            .query(&[("maxRecords", self.max_records.to_string())]);
        if let Some(locator) = &self.locator {
            request = request.query(&[("locator", locator)]);
        }

        let response = self.store.send(request, Call::Query).await?;
        let locator = response
            .headers()
            .get(LOCATOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty() && *v != "null")
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("Failed to read bulk results: {e}")))?;

        self.done = locator.is_none();
        self.locator = locator;
        Ok(Some(body))
    }
}

impl RecordStore for SalesforceStore {
    type Pages = QueryPager;
    type Chunks = BulkResults;

    async fn query(&self, soql: &str) -> Result<QueryPager> {
        let url = reqwest::Url::parse_with_params(&self.data_url("query"), &[("q", soql)])
            .map_err(|e| Error::Query(format!("Invalid query URL: {e}")))?;
        let (page, next_url) = self.fetch_query_page(url.as_str()).await?;
        Ok(QueryPager {
            store: self.clone(),
            pending: Some(page),
            next_url,
        })
    }

    async fn bulk_query(&self, soql: &str, max_records_per_chunk: usize) -> Result<BulkResults> {
        let request = self
            .client
            .post(self.data_url("jobs/query"))
            .json(&json!({ "operation": "query", "query": soql }));
        let job: JobInfo = self
            .send(request, Call::Query)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format!("Failed to parse query job: {e}")))?;
        debug!(job_id = %job.id, "bulk query job created");

        let info = self.wait_for_job("query", &job.id, Call::Query).await?;
        if info.state != "JobComplete" {
            return Err(Error::Query(info.failure_message()));
        }

        Ok(BulkResults {
            store: self.clone(),
            job_id: job.id,
            max_records: max_records_per_chunk.max(1),
            locator: None,
            done: false,
        })
    }

    async fn bulk_upsert(&self, payload: &UpsertPayload) -> Result<Vec<JobSummary>> {
        let request = self.client.post(self.data_url("jobs/ingest")).json(&json!({
            "object": self.object,
            "externalIdFieldName": payload.external_id_field,
            "contentType": "CSV",
            "operation": "upsert",
            "lineEnding": "LF",
        }));
        let job: JobInfo = self
            .send(request, Call::Job)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format!("Failed to parse ingest job: {e}")))?;
        debug!(job_id = %job.id, records = payload.records, "ingest job created");

        if let Err(e) = self.upload_and_close(&job.id, &payload.csv).await {
            self.abort_ingest(&job.id).await;
            return Err(e);
        }

        let info = self.wait_for_job("ingest", &job.id, Call::Job).await?;
        if info.state != "JobComplete" {
            return Err(Error::RemoteJob {
                batch: 0,
                message: info.failure_message(),
            });
        }
        Ok(vec![JobSummary {
            job_id: info.id,
            processed: info.number_records_processed,
            failed: info.number_records_failed,
        }])
    }

    async fn fetch_failed_records(&self, job_id: &str) -> Result<String> {
        let request = self
            .client
            .get(self.data_url(&format!("jobs/ingest/{job_id}/failedResults/")));
        self.send(request, Call::Job)
            .await?
            .text()
            .await
            .map_err(|e| Error::Http(format!("Failed to read failed results: {e}")))
    }

    async fn create_record(&self, fields: &BTreeMap<String, String>) -> Result<String> {
        let label = fields.get("Name").map_or("<unnamed>", String::as_str);
        let request = self
            .client
            .post(self.data_url(&format!("sobjects/{}/", self.object)))
            .json(fields);
        let created: CreateResponse = self
            .send(request, Call::Record(label))
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format!("Failed to parse create response: {e}")))?;
        Ok(created.id)
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.data_url(&format!("sobjects/{}/{id}", self.object)));
        self.send(request, Call::Record(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_url() {
        assert_eq!(instance_url("na1.my.salesforce.com"), "https://na1.my.salesforce.com");
        assert_eq!(instance_url("https://x.example.com/"), "https://x.example.com");
    }

    #[test]
    fn test_classify_malformed_record() {
        let body =
            r#"[{"message":"entity is deleted","errorCode":"ENTITY_IS_DELETED","fields":[]}]"#;
        let err = classify(StatusCode::BAD_REQUEST, body, Call::Record("001A"));
        match err {
            Error::RemoteRecord { record, message } => {
                assert_eq!(record, "001A");
                assert!(message.starts_with("ENTITY_IS_DELETED"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classify_session_and_query() {
        let body = r#"[{"message":"Session expired or invalid","errorCode":"INVALID_SESSION_ID"}]"#;
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, body, Call::Record("x")),
            Error::Connection(_)
        ));

        let body = r#"[{"message":"unexpected token","errorCode":"MALFORMED_QUERY"}]"#;
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, body, Call::Query),
            Error::Query(_)
        ));
    }

    #[test]
    fn test_classify_unstructured_body() {
        let err = classify(StatusCode::BAD_GATEWAY, "upstream down", Call::Job);
        assert!(matches!(err, Error::Http(msg) if msg.contains("upstream down")));
    }

    #[test]
    fn test_row_from_json() {
        let value = json!({
            "attributes": {"type": "Account"},
            "Id": "001A",
            "NumberOfEmployees": 12,
            "Phone": null
        });
        let Value::Object(map) = value else { unreachable!() };
        let row = row_from_json(map);
        assert_eq!(row.len(), 2);
        assert_eq!(row["NumberOfEmployees"], "12");
    }
}
