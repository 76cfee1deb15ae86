//! Load generation: repeatedly submit a cache-busting heavy query so slot
//! consumption shows up in monitoring and in the slot analysis report.

use crate::gcp::bigquery::{self, QueryOptions};
use crate::gcp::http::format_gcp_error;
use crate::gcp::{ApiError, BqClient};
use std::time::Duration;

/// Regex scan over a large public table; roughly 30 GB processed per run.
pub const HEAVY_QUERY: &str = r#"SELECT
    REGEXP_CONTAINS(title, r'(?i)python|java|c\+\+') as is_popular_lang,
    COUNT(*) as count
FROM `bigquery-public-data.stackoverflow.posts_questions`
WHERE creation_date > '2020-01-01'
GROUP BY 1"#;

const PAUSE_BETWEEN_ITERATIONS: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct LoadgenOptions {
    pub iterations: u32,
}

/// Run the heavy query `iterations` times with the cache disabled,
/// reporting each run's slot consumption. A failed iteration is logged and
/// the loop keeps going.
pub async fn run(client: &BqClient, opts: &LoadgenOptions) -> anyhow::Result<()> {
    let query_opts = QueryOptions {
        use_cache: false,
        ..QueryOptions::default()
    };

    for iteration in 1..=opts.iterations {
        tracing::info!(iteration, total = opts.iterations, "starting iteration");
        tracing::info!("query submitted, waiting for result (this may take 10-20s)");

        match run_one(client, &query_opts).await {
            Ok(slot_millis) => {
                tracing::info!(iteration, slot_millis, "heavy query finished");
            }
            Err(err) => {
                tracing::error!(
                    iteration,
                    error = %format_gcp_error(&err),
                    "iteration failed"
                );
            }
        }

        tokio::time::sleep(PAUSE_BETWEEN_ITERATIONS).await;
    }

    Ok(())
}

async fn run_one(client: &BqClient, opts: &QueryOptions) -> Result<i64, ApiError> {
    let result = bigquery::run_query(client, HEAVY_QUERY, opts).await?;
    tracing::debug!(job_id = %result.job.job_id, "query complete, fetching slot usage");
    bigquery::job_slot_millis(client, &result.job).await
}
