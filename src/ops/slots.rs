//! Slot usage analysis across every project under a parent scope.
//!
//! Each project is asked for its hourly slot consumption over the lookback
//! window, per region, via `INFORMATION_SCHEMA.JOBS_BY_PROJECT`. Workers only
//! gather rows; the coordinator writes the one report, in target order, so
//! repeated runs over the same data produce identical files.

use crate::discovery::{self, Target};
use crate::gcp::bigquery::{self, QueryOptions};
use crate::gcp::http::format_gcp_error;
use crate::gcp::BqClient;
use crate::report::rows::{self, SlotRow};
use crate::report::sink::CsvSink;
use crate::sweep::fanout;
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const SLOT_HEADER: &[&str] = &[
    "project_id",
    "region",
    "hour",
    "avg_slots",
    "max_slot_sec",
    "labels",
];

#[derive(Debug, Clone)]
pub struct SlotOptions {
    /// Parent scope searched for projects
    pub parent: String,
    /// Regional qualifiers to scan, e.g. `region-us`
    pub regions: Vec<String>,
    /// Days of job history to aggregate
    pub lookback_days: u32,
    pub output: PathBuf,
    pub concurrency: usize,
    pub fallback_projects: Vec<String>,
}

/// Hourly aggregation over the lookback window; hours with effectively zero
/// usage are filtered server-side.
pub fn slot_query(region: &str, lookback_days: u32) -> String {
    format!(
        r#"SELECT
    TIMESTAMP_TRUNC(creation_time, HOUR) as hour,
    SUM(total_slot_ms) / (1000 * 60 * 60) as avg_slots_per_hour,
    MAX(total_slot_ms) / 1000 as max_slot_seconds_single_job
FROM `{region}`.INFORMATION_SCHEMA.JOBS_BY_PROJECT
WHERE creation_time > TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {lookback_days} DAY)
GROUP BY 1
HAVING avg_slots_per_hour > 0.0001"#
    )
}

/// Discover targets, fan out the per-project analysis, and write the report.
pub async fn run(client: &BqClient, opts: &SlotOptions) -> anyhow::Result<()> {
    tracing::info!(parent = %opts.parent, "starting slot analysis");

    let targets =
        discovery::discover_targets(client, &opts.parent, &opts.fallback_projects).await;
    tracing::info!(count = targets.len(), "processing projects");

    let base = client.clone();
    let regions = opts.regions.clone();
    let lookback_days = opts.lookback_days;

    let worker = move |target: Target| {
        let client = base.for_project(&target.project_id);
        let regions = regions.clone();
        async move { analyze_target(&client, &target, &regions, lookback_days).await }
    };

    let outcomes = fanout::run(targets, opts.concurrency, worker).await;

    // Outcomes arrive in target order, which fixes the report's row order.
    let mut all_rows: Vec<SlotRow> = Vec::new();
    for (target, result) in outcomes {
        match result {
            Ok(slot_rows) => {
                if !slot_rows.is_empty() {
                    tracing::info!(
                        project = %target.project_id,
                        points = slot_rows.len(),
                        "found data points"
                    );
                }
                all_rows.extend(slot_rows);
            }
            Err(err) => {
                tracing::error!(project = %target.project_id, error = %err, "slot analysis failed");
            }
        }
    }

    if all_rows.is_empty() {
        println!("No slot usage found in the last {} days.", opts.lookback_days);
        return Ok(());
    }

    let mut csv = CsvSink::create(&opts.output, SLOT_HEADER)?;
    for row in &all_rows {
        csv.append(row)?;
    }
    let path = csv.finish()?;

    println!("\nSuccess! Report saved to {}", path.display());
    Ok(())
}

/// Query every region for one project. Regions that fail (no BigQuery, no
/// permission, no regional history) contribute nothing.
async fn analyze_target(
    client: &BqClient,
    target: &Target,
    regions: &[String],
    lookback_days: u32,
) -> anyhow::Result<Vec<SlotRow>> {
    let labels = rows::format_labels(&target.labels);
    let mut out = Vec::new();

    for region in regions {
        let sql = slot_query(region, lookback_days);
        match bigquery::run_query(client, &sql, &QueryOptions::default()).await {
            Ok(result) => {
                for row in &result.rows {
                    out.push(slot_row(&target.project_id, region, &labels, row));
                }
            }
            Err(err) => {
                tracing::debug!(
                    project = %target.project_id,
                    region = %region,
                    error = %format_gcp_error(&err),
                    "slot query failed"
                );
            }
        }
    }

    Ok(out)
}

fn slot_row(project_id: &str, region: &str, labels: &str, row: &Map<String, Value>) -> SlotRow {
    SlotRow {
        project_id: project_id.to_string(),
        region: region.to_string(),
        hour: row
            .get("hour")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        avg_slots: rows::round5(float_of(row.get("avg_slots_per_hour"))),
        max_slot_sec: rows::round2(float_of(row.get("max_slot_seconds_single_job"))),
        labels: labels.to_string(),
    }
}

fn float_of(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slot_query_targets_region_qualifier() {
        let sql = slot_query("region-us", 30);
        assert!(sql.contains("FROM `region-us`.INFORMATION_SCHEMA.JOBS_BY_PROJECT"));
        assert!(sql.contains("INTERVAL 30 DAY"));
        assert!(sql.contains("HAVING avg_slots_per_hour > 0.0001"));
    }

    #[test]
    fn test_slot_query_lookback_is_injected() {
        let sql = slot_query("region-eu", 7);
        assert!(sql.contains("INTERVAL 7 DAY"));
    }

    #[test]
    fn test_slot_row_rounds_and_labels() {
        let raw = json!({
            "hour": "2024-05-01T13:00:00+00:00",
            "avg_slots_per_hour": 1.2345678,
            "max_slot_seconds_single_job": 99.999,
        });

        let row = slot_row("proj", "region-eu", "env:prod", raw.as_object().unwrap());
        assert_eq!(row.hour, "2024-05-01T13:00:00+00:00");
        assert_eq!(row.avg_slots, 1.23457);
        assert_eq!(row.max_slot_sec, 100.0);
        assert_eq!(row.labels, "env:prod");
        assert_eq!(row.region, "region-eu");
    }

    #[test]
    fn test_slot_row_missing_cells() {
        let raw = json!({});
        let row = slot_row("proj", "region-us", "no-label", raw.as_object().unwrap());
        assert_eq!(row.hour, "");
        assert_eq!(row.avg_slots, 0.0);
        assert_eq!(row.max_slot_sec, 0.0);
    }
}
