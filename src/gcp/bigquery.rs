//! BigQuery v2 API surface
//!
//! Typed wrappers over the REST endpoints the sweep commands use: query
//! execution with blocking completion, dataset/table listing and detail,
//! and job history.

use super::client::BqClient;
use super::http::ApiError;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

// =============================================================================
// Datasets
// =============================================================================

/// Reference uniquely naming a dataset
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRef {
    pub project_id: String,
    pub dataset_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetListItem {
    pub dataset_reference: DatasetRef,
    #[serde(default)]
    pub location: Option<String>,
}

/// Full dataset resource as returned by `datasets.get`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub dataset_reference: DatasetRef,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Epoch milliseconds, serialized by the API as a string
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub last_modified_time: Option<String>,
    #[serde(default)]
    pub default_table_expiration_ms: Option<String>,
    /// Raw access entries; exported verbatim
    #[serde(default)]
    pub access: Vec<Value>,
    #[serde(default, rename = "type")]
    pub dataset_type: Option<String>,
}

impl Dataset {
    /// Linked datasets (Analytics Hub) hold no storage of their own.
    pub fn is_linked(&self) -> bool {
        self.dataset_type.as_deref() == Some("LINKED")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDatasetsResponse {
    #[serde(default)]
    datasets: Vec<DatasetListItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// List all datasets in the client's project (auto-paginate)
pub async fn list_all_datasets(client: &BqClient) -> Result<Vec<DatasetListItem>, ApiError> {
    let url = client.bigquery_url("datasets");
    let mut items = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(token) = &page_token {
            params.push(("pageToken", token.clone()));
        }

        let response = client.get(&url, &params).await?;
        let page: ListDatasetsResponse = serde_json::from_value(response)?;
        items.extend(page.datasets);

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(items)
}

/// Fetch the full dataset resource
pub async fn get_dataset(client: &BqClient, dataset_id: &str) -> Result<Dataset, ApiError> {
    let response = client.get(&client.dataset_url(dataset_id), &[]).await?;
    Ok(serde_json::from_value(response)?)
}

// =============================================================================
// Tables
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableListItem {
    pub table_reference: TableRef,
    #[serde(default, rename = "type")]
    pub table_type: Option<String>,
}

/// One column in a table schema; nested for RECORD columns
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePartitioning {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangePartitioning {
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clustering {
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Full table resource as returned by `tables.get`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub table_reference: TableRef,
    #[serde(default, rename = "type")]
    pub table_type: Option<String>,
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub time_partitioning: Option<TimePartitioning>,
    #[serde(default)]
    pub range_partitioning: Option<RangePartitioning>,
    #[serde(default)]
    pub clustering: Option<Clustering>,
    /// Logical bytes; the basic table resource does not expose physical bytes
    #[serde(default)]
    pub num_bytes: Option<String>,
    #[serde(default)]
    pub num_rows: Option<String>,
}

impl Table {
    pub fn type_name(&self) -> &str {
        self.table_type.as_deref().unwrap_or("UNKNOWN")
    }

    /// Logical views and federated external tables carry no billable storage
    /// and are excluded from storage reports.
    pub fn is_view_or_external(&self) -> bool {
        matches!(self.type_name(), "VIEW" | "EXTERNAL")
    }

    pub fn logical_bytes(&self) -> i64 {
        self.num_bytes
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    pub fn row_count(&self) -> i64 {
        self.num_rows
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTablesResponse {
    #[serde(default)]
    tables: Vec<TableListItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// List all tables in a dataset (auto-paginate)
pub async fn list_all_tables(
    client: &BqClient,
    dataset_id: &str,
) -> Result<Vec<TableListItem>, ApiError> {
    let url = client.tables_url(dataset_id, None);
    let mut items = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(token) = &page_token {
            params.push(("pageToken", token.clone()));
        }

        let response = client.get(&url, &params).await?;
        let page: ListTablesResponse = serde_json::from_value(response)?;
        items.extend(page.tables);

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(items)
}

/// Fetch the full table resource
pub async fn get_table(
    client: &BqClient,
    dataset_id: &str,
    table_id: &str,
) -> Result<Table, ApiError> {
    let response = client
        .get(&client.tables_url(dataset_id, Some(table_id)), &[])
        .await?;
    Ok(serde_json::from_value(response)?)
}

// =============================================================================
// Queries
// =============================================================================

/// Reference to a submitted query job
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub project_id: String,
    pub job_id: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Column name/type pair from a query result schema
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

/// Tuning for a single query submission
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub use_cache: bool,
    /// Server-side long-poll window per request; completion is awaited by
    /// re-polling, not by failing.
    pub timeout_ms: u64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            timeout_ms: 30_000,
        }
    }
}

/// Decoded result of a completed query
#[derive(Debug)]
pub struct ResultSet {
    pub job: JobRef,
    pub schema: Vec<FieldSchema>,
    /// One map per row, keyed by column name, values decoded per schema type
    pub rows: Vec<Map<String, Value>>,
    pub cache_hit: Option<bool>,
    pub total_bytes_processed: Option<i64>,
}

/// Submit a query and block until it completes, collecting all result pages.
pub async fn run_query(
    client: &BqClient,
    sql: &str,
    opts: &QueryOptions,
) -> Result<ResultSet, ApiError> {
    let body = json!({
        "query": sql,
        "useLegacySql": false,
        "useQueryCache": opts.use_cache,
        "timeoutMs": opts.timeout_ms,
    });

    let mut response = client.post(&client.bigquery_url("queries"), &body).await?;

    let job: JobRef = serde_json::from_value(
        response
            .get("jobReference")
            .cloned()
            .ok_or_else(|| ApiError::Malformed("query response missing jobReference".into()))?,
    )?;

    // The server holds each poll open up to timeoutMs, so this loop is a
    // long-poll, not a busy wait.
    while !response
        .get("jobComplete")
        .and_then(Value::as_bool)
        .unwrap_or(true)
    {
        tracing::debug!(job_id = %job.job_id, "query still running, polling");
        response = get_query_results(client, &job, opts, None).await?;
    }

    let mut schema = parse_schema(&response);
    let mut rows = Vec::new();
    append_rows(&schema, &response, &mut rows);

    let cache_hit = response.get("cacheHit").and_then(Value::as_bool);
    let total_bytes_processed = int_value(response.get("totalBytesProcessed"));

    let mut page_token = page_token_of(&response);
    while let Some(token) = page_token {
        let page = get_query_results(client, &job, opts, Some(&token)).await?;
        if schema.is_empty() {
            schema = parse_schema(&page);
        }
        append_rows(&schema, &page, &mut rows);
        page_token = page_token_of(&page);
    }

    Ok(ResultSet {
        job,
        schema,
        rows,
        cache_hit,
        total_bytes_processed,
    })
}

async fn get_query_results(
    client: &BqClient,
    job: &JobRef,
    opts: &QueryOptions,
    page_token: Option<&str>,
) -> Result<Value, ApiError> {
    let url = client.bigquery_url(&format!("queries/{}", job.job_id));
    let mut params: Vec<(&str, String)> = vec![("timeoutMs", opts.timeout_ms.to_string())];
    if let Some(location) = &job.location {
        params.push(("location", location.clone()));
    }
    if let Some(token) = page_token {
        params.push(("pageToken", token.to_string()));
    }
    client.get(&url, &params).await
}

fn parse_schema(response: &Value) -> Vec<FieldSchema> {
    response
        .get("schema")
        .and_then(|s| s.get("fields"))
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| serde_json::from_value(f.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn append_rows(schema: &[FieldSchema], response: &Value, out: &mut Vec<Map<String, Value>>) {
    let Some(raw_rows) = response.get("rows").and_then(Value::as_array) else {
        return;
    };

    for raw in raw_rows {
        let mut decoded = Map::new();
        if let Some(cells) = raw.get("f").and_then(Value::as_array) {
            for (field, cell) in schema.iter().zip(cells) {
                let value = cell.get("v").unwrap_or(&Value::Null);
                decoded.insert(field.name.clone(), decode_cell(&field.field_type, value));
            }
        }
        out.push(decoded);
    }
}

fn page_token_of(response: &Value) -> Option<String> {
    response
        .get("pageToken")
        .and_then(Value::as_str)
        .map(String::from)
}

/// Decode one result cell according to its schema type.
///
/// The REST API serializes every scalar as a string; integers arrive as
/// `"123"`, floats and timestamps often in scientific notation.
pub fn decode_cell(field_type: &str, value: &Value) -> Value {
    let Some(text) = value.as_str() else {
        // NULL cells and nested/repeated values pass through untouched
        return value.clone();
    };

    match field_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT64" => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        "BOOLEAN" | "BOOL" => Value::Bool(text == "true"),
        "TIMESTAMP" => decode_timestamp(text)
            .map(Value::String)
            .unwrap_or_else(|| Value::String(text.to_string())),
        _ => Value::String(text.to_string()),
    }
}

/// TIMESTAMP cells arrive as fractional epoch seconds (e.g. `1.7005248E9`);
/// render them as RFC 3339 in UTC.
fn decode_timestamp(text: &str) -> Option<String> {
    let epoch: f64 = text.parse().ok()?;
    let secs = epoch.trunc() as i64;
    let nanos = ((epoch - epoch.trunc()) * 1e9).round() as u32;
    let dt = chrono::DateTime::from_timestamp(secs, nanos)?;
    Some(dt.to_rfc3339())
}

// =============================================================================
// Jobs
// =============================================================================

/// Summary of one job from `jobs.list`
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: String,
    pub user_email: String,
    pub job_type: String,
    pub created_ms: Option<i64>,
    pub ended_ms: Option<i64>,
    pub total_bytes_billed: i64,
    pub total_bytes_processed: i64,
    pub cache_hit: bool,
    pub error_message: Option<String>,
    pub query: Option<String>,
}

impl JobSummary {
    pub fn is_query(&self) -> bool {
        self.job_type.eq_ignore_ascii_case("query")
    }
}

impl From<&Value> for JobSummary {
    fn from(value: &Value) -> Self {
        let stats = value.get("statistics");
        let query_stats = stats.and_then(|s| s.get("query"));

        Self {
            job_id: value
                .get("jobReference")
                .and_then(|r| r.get("jobId"))
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string(),
            // The jobs API exposes this field in snake_case
            user_email: value
                .get("user_email")
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string(),
            job_type: value
                .get("configuration")
                .and_then(|c| c.get("jobType"))
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string(),
            created_ms: stats.and_then(|s| int_value(s.get("creationTime"))),
            ended_ms: stats.and_then(|s| int_value(s.get("endTime"))),
            total_bytes_billed: query_stats
                .and_then(|q| int_value(q.get("totalBytesBilled")))
                .unwrap_or(0),
            total_bytes_processed: query_stats
                .and_then(|q| int_value(q.get("totalBytesProcessed")))
                .unwrap_or(0),
            cache_hit: query_stats
                .and_then(|q| q.get("cacheHit"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            error_message: value
                .get("status")
                .and_then(|s| s.get("errorResult"))
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(String::from),
            query: value
                .get("configuration")
                .and_then(|c| c.get("query"))
                .and_then(|q| q.get("query"))
                .and_then(Value::as_str)
                .map(String::from),
        }
    }
}

/// One page of job history.
#[derive(Debug)]
pub struct JobsPage {
    pub jobs: Vec<JobSummary>,
    pub next_page_token: Option<String>,
}

/// Fetch one page of job history for the client's project.
///
/// `min_creation_time_ms` bounds the listing server-side; `projection=full`
/// is requested so the job configuration (query text) is included.
pub async fn list_jobs_page(
    client: &BqClient,
    all_users: bool,
    min_creation_time_ms: i64,
    page_token: Option<&str>,
) -> Result<JobsPage, ApiError> {
    let url = client.bigquery_url("jobs");
    let mut params: Vec<(&str, String)> = vec![
        ("allUsers", all_users.to_string()),
        ("minCreationTime", min_creation_time_ms.to_string()),
        ("projection", "full".to_string()),
    ];
    if let Some(token) = page_token {
        params.push(("pageToken", token.to_string()));
    }

    let response = client.get(&url, &params).await?;

    let jobs = response
        .get("jobs")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(JobSummary::from).collect())
        .unwrap_or_default();

    let next_page_token = response
        .get("nextPageToken")
        .and_then(Value::as_str)
        .map(String::from);

    Ok(JobsPage {
        jobs,
        next_page_token,
    })
}

/// Total slot-milliseconds consumed by a finished job.
pub async fn job_slot_millis(client: &BqClient, job: &JobRef) -> Result<i64, ApiError> {
    let url = client.bigquery_url(&format!("jobs/{}", job.job_id));
    let mut params: Vec<(&str, String)> = Vec::new();
    if let Some(location) = &job.location {
        params.push(("location", location.clone()));
    }

    let response = client.get(&url, &params).await?;
    Ok(response
        .get("statistics")
        .and_then(|s| int_value(s.get("totalSlotMs")))
        .unwrap_or(0))
}

/// Read an int64 that the API may serialize as a string or a number.
fn int_value(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::String(s)) => s.parse().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    }
}
