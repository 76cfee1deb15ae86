//! Dataset region grouping.
//!
//! Regional `INFORMATION_SCHEMA` views only answer for their own region, so
//! storage sweeps first bucket every dataset by location and then scan one
//! region at a time.

use crate::gcp::bigquery::{self, Dataset};
use crate::gcp::http::format_gcp_error;
use crate::gcp::{ApiError, BqClient};
use std::collections::BTreeMap;

/// Location assumed when a dataset reports none
pub const DEFAULT_REGION: &str = "US";

/// Datasets bucketed by location, ordered by region name
pub type RegionMap = BTreeMap<String, Vec<Dataset>>;

/// Fetch every dataset in the client's project and group them by region.
///
/// Linked datasets (Analytics Hub) are skipped; a dataset whose detail fetch
/// fails is skipped with a warning rather than aborting the sweep.
pub async fn discover_dataset_regions(client: &BqClient) -> Result<RegionMap, ApiError> {
    let items = bigquery::list_all_datasets(client).await?;
    let mut datasets = Vec::new();

    for item in items {
        let dataset_id = item.dataset_reference.dataset_id.clone();
        match bigquery::get_dataset(client, &dataset_id).await {
            Ok(dataset) => {
                if dataset.is_linked() {
                    tracing::info!(dataset = %dataset_id, "skipping linked dataset");
                    continue;
                }
                datasets.push(dataset);
            }
            Err(err) => {
                tracing::warn!(
                    dataset = %dataset_id,
                    error = %format_gcp_error(&err),
                    "could not fetch dataset details"
                );
            }
        }
    }

    Ok(group_by_region(datasets))
}

/// Bucket datasets by location; missing or empty locations land in
/// [`DEFAULT_REGION`]. Region order is alphabetical, dataset order is
/// input order.
pub fn group_by_region(datasets: Vec<Dataset>) -> RegionMap {
    let mut map = RegionMap::new();
    for dataset in datasets {
        let region = dataset
            .location
            .clone()
            .filter(|location| !location.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        map.entry(region).or_default().push(dataset);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset(id: &str, location: Option<&str>) -> Dataset {
        serde_json::from_value(json!({
            "datasetReference": {"projectId": "p", "datasetId": id},
            "location": location,
        }))
        .unwrap()
    }

    #[test]
    fn test_group_by_region_buckets_by_location() {
        let grouped = group_by_region(vec![
            dataset("a", Some("US")),
            dataset("b", Some("europe-west2")),
            dataset("c", Some("US")),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["US"].len(), 2);
        assert_eq!(grouped["europe-west2"].len(), 1);
    }

    #[test]
    fn test_group_by_region_defaults_unknown_location() {
        let grouped = group_by_region(vec![dataset("a", None), dataset("b", Some(""))]);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[DEFAULT_REGION].len(), 2);
    }

    #[test]
    fn test_group_by_region_orders_regions_alphabetically() {
        let grouped = group_by_region(vec![
            dataset("a", Some("us-central1")),
            dataset("b", Some("EU")),
            dataset("c", Some("asia-northeast1")),
        ]);

        let regions: Vec<&str> = grouped.keys().map(String::as_str).collect();
        assert_eq!(regions, vec!["EU", "asia-northeast1", "us-central1"]);
    }
}
