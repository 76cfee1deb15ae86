//! Inventory sync: copy recent job history from every reachable project
//! into one central table.
//!
//! Each project runs an `INSERT INTO ... SELECT` against its regional
//! `INFORMATION_SCHEMA.JOBS` view, so the destination keeps the source
//! schema as-is and daily runs stay incremental via the creation_time
//! filter.

use crate::discovery::{self, Target};
use crate::gcp::bigquery::{self, QueryOptions};
use crate::gcp::BqClient;
use crate::sweep::fanout;

#[derive(Debug, Clone)]
pub struct InventoryOptions {
    /// Parent scope searched for projects
    pub parent: String,
    /// Destination table as `project.dataset.table`
    pub dest_table: String,
    pub lookback_days: u32,
    pub concurrency: usize,
    /// Projects swept even when discovery misses them
    pub fallback_projects: Vec<String>,
}

/// What one project's sync worker reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Synced,
    /// BigQuery not enabled, no job history, or no permission; expected for
    /// part of any fleet and not worth a diagnostic.
    SkippedNoAccess,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The INSERT..SELECT shipping one project's recent jobs to the central
/// table.
pub fn sync_statement(dest_table: &str, project_id: &str, lookback_days: u32) -> String {
    format!(
        r#"INSERT INTO `{dest_table}`
SELECT *
FROM `{project_id}.region-us`.INFORMATION_SCHEMA.JOBS
WHERE creation_time > TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {lookback_days} DAY)"#
    )
}

/// Discover targets, fan out the sync, and report a tally.
pub async fn run(client: &BqClient, opts: &InventoryOptions) -> anyhow::Result<SyncSummary> {
    tracing::info!(dest = %opts.dest_table, "starting inventory sync");

    let targets =
        discovery::discover_targets(client, &opts.parent, &opts.fallback_projects).await;
    tracing::info!(count = targets.len(), "found projects to check");

    let base = client.clone();
    let dest_table = opts.dest_table.clone();
    let lookback_days = opts.lookback_days;

    let worker = move |target: Target| {
        let client = base.for_project(&target.project_id);
        let dest_table = dest_table.clone();
        async move { sync_one(&client, &dest_table, lookback_days).await }
    };

    let outcomes = fanout::run(targets, opts.concurrency, worker).await;
    let summary = tally(outcomes);

    println!(
        "\nSync complete. {} synced, {} skipped, {} failed.",
        summary.synced, summary.skipped, summary.failed
    );
    Ok(summary)
}

async fn sync_one(
    client: &BqClient,
    dest_table: &str,
    lookback_days: u32,
) -> anyhow::Result<SyncStatus> {
    let sql = sync_statement(dest_table, &client.project_id, lookback_days);
    match bigquery::run_query(client, &sql, &QueryOptions::default()).await {
        Ok(_) => Ok(SyncStatus::Synced),
        Err(err) if err.is_access_denied() || err.is_not_found() => {
            Ok(SyncStatus::SkippedNoAccess)
        }
        Err(err) => Err(err.into()),
    }
}

/// Fold worker outcomes into a summary, logging as the coordinator.
fn tally(outcomes: Vec<(Target, anyhow::Result<SyncStatus>)>) -> SyncSummary {
    let mut summary = SyncSummary::default();

    for (target, result) in outcomes {
        match result {
            Ok(SyncStatus::Synced) => {
                summary.synced += 1;
                tracing::info!(project = %target.project_id, "synced jobs");
            }
            Ok(SyncStatus::SkippedNoAccess) => {
                summary.skipped += 1;
                tracing::debug!(project = %target.project_id, "skipped, no access or not found");
            }
            Err(err) => {
                summary.failed += 1;
                tracing::error!(project = %target.project_id, error = %err, "sync failed");
            }
        }
    }

    summary
}
