//! Single-project export: dataset metadata, storage usage, query history.
//!
//! Output lands under one directory:
//!
//! ```text
//! <output_dir>/config/datasets/<dataset>.json
//! <output_dir>/config/schemas/<dataset>/<table>.json
//! <output_dir>/storage/storage_usage.csv
//! <output_dir>/queries/query_history_<days>days.csv
//! ```

use crate::discovery::regions;
use crate::gcp::bigquery::{self, Dataset, JobSummary, QueryOptions, Table, TableFieldSchema};
use crate::gcp::http::format_gcp_error;
use crate::gcp::{ApiError, BqClient};
use crate::report::rows::{self, QueryHistoryRow, StorageRow};
use crate::report::sink::{self, CsvSink};
use crate::sweep::dual_path::{fetch_scope, FetchMethod};
use anyhow::Context;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const STORAGE_HEADER: &[&str] = &[
    "project_id",
    "dataset_id",
    "table_name",
    "table_type",
    "region",
    "total_rows",
    "logical_bytes",
    "physical_bytes",
    "logical_gb",
    "physical_gb",
    "method",
];

pub const QUERY_HEADER: &[&str] = &[
    "job_id",
    "user_email",
    "created",
    "ended",
    "duration_sec",
    "bytes_billed",
    "bytes_processed",
    "cache_hit",
    "error_result",
    "query_snippet",
];

/// Which export steps to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportMode {
    All,
    Config,
    Storage,
    Queries,
}

impl ExportMode {
    fn includes_config(self) -> bool {
        matches!(self, ExportMode::All | ExportMode::Config)
    }

    fn includes_storage(self) -> bool {
        matches!(self, ExportMode::All | ExportMode::Storage)
    }

    fn includes_queries(self) -> bool {
        matches!(self, ExportMode::All | ExportMode::Queries)
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub mode: ExportMode,
    /// Query history window in days
    pub days: u32,
    /// Jobs from this user are dropped from the query report
    pub exclude_user: Option<String>,
}

/// Run the selected export steps for the client's project.
pub async fn run(client: &BqClient, opts: &ExportOptions) -> anyhow::Result<()> {
    setup_output_dir(&opts.output_dir)?;

    if opts.mode.includes_config() {
        export_configuration(client, opts).await?;
    }
    if opts.mode.includes_storage() {
        export_storage_usage(client, opts).await?;
    }
    if opts.mode.includes_queries() {
        export_query_usage(client, opts).await?;
    }

    println!(
        "\nAll requested exports completed. Check directory: {}",
        opts.output_dir.display()
    );
    Ok(())
}

fn setup_output_dir(output_dir: &Path) -> anyhow::Result<()> {
    for sub in ["config/datasets", "config/schemas", "storage", "queries"] {
        let dir = output_dir.join(sub);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }
    Ok(())
}

// =============================================================================
// Configuration export
// =============================================================================

async fn export_configuration(client: &BqClient, opts: &ExportOptions) -> anyhow::Result<()> {
    tracing::info!(project = %client.project_id, "starting configuration export");

    let datasets = bigquery::list_all_datasets(client)
        .await
        .context("listing datasets")?;
    tracing::info!(count = datasets.len(), "found datasets");

    for item in &datasets {
        let dataset_id = &item.dataset_reference.dataset_id;
        if let Err(err) = export_dataset_config(client, dataset_id, &opts.output_dir).await {
            tracing::warn!(dataset = %dataset_id, error = %err, "error processing dataset");
        }
    }

    Ok(())
}

async fn export_dataset_config(
    client: &BqClient,
    dataset_id: &str,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let dataset = bigquery::get_dataset(client, dataset_id).await?;
    if dataset.is_linked() {
        tracing::info!(dataset = %dataset_id, "skipping linked dataset");
        return Ok(());
    }

    let path = output_dir
        .join("config")
        .join("datasets")
        .join(format!("{dataset_id}.json"));
    sink::write_json(&path, &dataset_config_json(&dataset))?;

    tracing::info!(dataset = %dataset_id, "exporting table schemas");
    let tables = bigquery::list_all_tables(client, dataset_id).await?;

    for item in &tables {
        let table_id = &item.table_reference.table_id;
        match bigquery::get_table(client, dataset_id, table_id).await {
            Ok(table) => {
                if table.is_view_or_external() {
                    continue;
                }
                let path = output_dir
                    .join("config")
                    .join("schemas")
                    .join(dataset_id)
                    .join(format!("{table_id}.json"));
                sink::write_json(&path, &table_config_json(&table))?;
            }
            Err(err) => {
                tracing::warn!(
                    table = %table_id,
                    error = %format_gcp_error(&err),
                    "error processing table"
                );
            }
        }
    }

    Ok(())
}

fn dataset_config_json(dataset: &Dataset) -> Value {
    json!({
        "dataset_id": dataset.dataset_reference.dataset_id,
        "location": dataset.location,
        "description": dataset.description,
        "labels": dataset.labels,
        "created": ms_string_to_rfc3339(&dataset.creation_time),
        "modified": ms_string_to_rfc3339(&dataset.last_modified_time),
        "default_table_expiration_ms": dataset
            .default_table_expiration_ms
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok()),
        "access_entries": dataset.access,
    })
}

fn table_config_json(table: &Table) -> Value {
    let schema: Vec<Value> = table
        .schema
        .as_ref()
        .map(|s| s.fields.iter().map(field_json).collect())
        .unwrap_or_default();

    json!({
        "table_id": table.table_reference.table_id,
        "type": table.type_name(),
        "partitioning": partitioning_label(table),
        "clustering": clustering_value(table),
        "schema": schema,
    })
}

fn field_json(field: &TableFieldSchema) -> Value {
    json!({
        "name": field.name,
        "type": field.field_type,
        // The API omits the mode of nullable columns
        "mode": field.mode.as_deref().unwrap_or("NULLABLE"),
        "description": field.description,
        "fields": field.fields.iter().map(field_json).collect::<Vec<_>>(),
    })
}

fn partitioning_label(table: &Table) -> String {
    if let Some(tp) = &table.time_partitioning {
        format!(
            "TIME ({}, field: {})",
            tp.kind,
            tp.field.as_deref().unwrap_or("None")
        )
    } else if let Some(rp) = &table.range_partitioning {
        format!("RANGE (field: {})", rp.field.as_deref().unwrap_or("None"))
    } else {
        "NONE".to_string()
    }
}

fn clustering_value(table: &Table) -> Value {
    match &table.clustering {
        Some(clustering) if !clustering.fields.is_empty() => json!(clustering.fields),
        _ => json!("NONE"),
    }
}

fn ms_string_to_rfc3339(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(rows::ms_to_rfc3339)
}

// =============================================================================
// Storage export
// =============================================================================

async fn export_storage_usage(client: &BqClient, opts: &ExportOptions) -> anyhow::Result<()> {
    let project_id = client.project_id.clone();
    tracing::info!(project = %project_id, "starting storage usage export");

    tracing::info!("discovering datasets and regions");
    let region_map = match regions::discover_dataset_regions(client).await {
        Ok(map) => map,
        Err(err) => {
            // Storage is one step of a larger export; a listing failure
            // should not abort the remaining steps.
            tracing::error!(error = %format_gcp_error(&err), "error listing datasets");
            return Ok(());
        }
    };

    if region_map.is_empty() {
        tracing::info!("no datasets found in this project");
        return Ok(());
    }

    let region_names: Vec<&str> = region_map.keys().map(String::as_str).collect();
    tracing::info!(regions = %region_names.join(", "), "found regions");

    let csv_path = opts.output_dir.join("storage").join("storage_usage.csv");
    let mut csv = CsvSink::create(&csv_path, STORAGE_HEADER)?;

    let mut total_tables = 0usize;

    for (region, datasets) in &region_map {
        tracing::info!(region = %region, datasets = datasets.len(), "processing region");

        let fast = fetch_storage_fast(client, &project_id, region);
        let slow = fetch_storage_fallback(client, &project_id, region, datasets);
        let (storage_rows, method) = fetch_scope(region, fast, slow).await?;

        for row in &storage_rows {
            csv.append(row)?;
        }
        total_tables += storage_rows.len();

        tracing::info!(
            region = %region,
            tables = storage_rows.len(),
            method = method.as_str(),
            "exported tables"
        );
    }

    if total_tables == 0 {
        tracing::warn!("no tables found in any region using either method");
    }

    let path = csv.finish()?;
    tracing::info!(tables = total_tables, path = %path.display(), "storage export finished");
    Ok(())
}

/// One aggregate query against the region's `TABLE_STORAGE` view.
async fn fetch_storage_fast(
    client: &BqClient,
    project_id: &str,
    region: &str,
) -> Result<Vec<StorageRow>, ApiError> {
    let sql = format!(
        "SELECT table_schema AS dataset_id, table_name, total_rows, \
         total_logical_bytes, total_physical_bytes \
         FROM `{project_id}.region-{region}.INFORMATION_SCHEMA.TABLE_STORAGE`"
    );

    let result = bigquery::run_query(client, &sql, &QueryOptions::default()).await?;
    Ok(result
        .rows
        .iter()
        .map(|row| storage_row_from_fast(project_id, region, row))
        .collect())
}

/// Per-table API iteration over every dataset in the region.
///
/// Individual dataset and table failures are logged and skipped; the
/// fallback as a whole reports whatever it could reach.
async fn fetch_storage_fallback(
    client: &BqClient,
    project_id: &str,
    region: &str,
    datasets: &[Dataset],
) -> Result<Vec<StorageRow>, ApiError> {
    let mut out = Vec::new();

    for dataset in datasets {
        let dataset_id = &dataset.dataset_reference.dataset_id;
        let tables = match bigquery::list_all_tables(client, dataset_id).await {
            Ok(tables) => tables,
            Err(err) => {
                tracing::warn!(
                    dataset = %dataset_id,
                    error = %format_gcp_error(&err),
                    "error accessing dataset"
                );
                continue;
            }
        };

        for item in tables {
            let table_id = &item.table_reference.table_id;
            match bigquery::get_table(client, dataset_id, table_id).await {
                Ok(table) if table.is_view_or_external() => {}
                Ok(table) => out.push(storage_row_from_table(project_id, region, dataset_id, &table)),
                Err(err) => {
                    tracing::warn!(
                        table = %table_id,
                        error = %format_gcp_error(&err),
                        "skipping table"
                    );
                }
            }
        }
    }

    Ok(out)
}

/// `TABLE_STORAGE` only lists storage-backed tables, so the type is fixed.
fn storage_row_from_fast(project_id: &str, region: &str, row: &Map<String, Value>) -> StorageRow {
    let logical = int_of(row.get("total_logical_bytes"));
    let physical = int_of(row.get("total_physical_bytes"));

    StorageRow {
        project_id: project_id.to_string(),
        dataset_id: str_of(row.get("dataset_id")),
        table_name: str_of(row.get("table_name")),
        table_type: "TABLE".to_string(),
        region: region.to_string(),
        total_rows: int_of(row.get("total_rows")),
        logical_bytes: logical,
        physical_bytes: physical,
        logical_gb: rows::bytes_to_gb(logical),
        physical_gb: rows::bytes_to_gb(physical),
        method: FetchMethod::Fast.as_str().to_string(),
    }
}

/// The basic table resource only exposes logical size, so physical stays 0.
fn storage_row_from_table(
    project_id: &str,
    region: &str,
    dataset_id: &str,
    table: &Table,
) -> StorageRow {
    let logical = table.logical_bytes();

    StorageRow {
        project_id: project_id.to_string(),
        dataset_id: dataset_id.to_string(),
        table_name: table.table_reference.table_id.clone(),
        table_type: table.type_name().to_string(),
        region: region.to_string(),
        total_rows: table.row_count(),
        logical_bytes: logical,
        physical_bytes: 0,
        logical_gb: rows::bytes_to_gb(logical),
        physical_gb: 0.0,
        method: FetchMethod::Fallback.as_str().to_string(),
    }
}

fn int_of(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn str_of(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or("").to_string()
}

// =============================================================================
// Query history export
// =============================================================================

async fn export_query_usage(client: &BqClient, opts: &ExportOptions) -> anyhow::Result<()> {
    tracing::info!(days = opts.days, "starting query usage export");

    let min_creation = Utc::now() - chrono::Duration::days(i64::from(opts.days));
    let min_ms = min_creation.timestamp_millis();

    let csv_path = opts
        .output_dir
        .join("queries")
        .join(format!("query_history_{}days.csv", opts.days));
    let mut csv = CsvSink::create(&csv_path, QUERY_HEADER)?;

    let mut count = 0usize;
    let mut page_token: Option<String> = None;

    loop {
        let page = bigquery::list_jobs_page(client, true, min_ms, page_token.as_deref())
            .await
            .context("listing jobs")?;

        for job in &page.jobs {
            if !job.is_query() {
                continue;
            }
            if let Some(excluded) = &opts.exclude_user {
                if &job.user_email == excluded {
                    continue;
                }
            }

            csv.append(&query_history_row(job))?;
            count += 1;
            if count % 100 == 0 {
                tracing::info!(processed = count, "processing query history");
            }
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    let path = csv.finish()?;
    tracing::info!(records = count, path = %path.display(), "finished query export");
    Ok(())
}

fn query_history_row(job: &JobSummary) -> QueryHistoryRow {
    QueryHistoryRow {
        job_id: job.job_id.clone(),
        user_email: job.user_email.clone(),
        created: rows::ms_field(job.created_ms),
        ended: rows::ms_field(job.ended_ms),
        duration_sec: rows::duration_seconds(job.created_ms, job.ended_ms),
        bytes_billed: job.total_bytes_billed,
        bytes_processed: job.total_bytes_processed,
        cache_hit: job.cache_hit,
        error_result: job.error_message.clone().unwrap_or_default(),
        query_snippet: job.query.as_deref().map(rows::query_snippet).unwrap_or_default(),
    }
}
