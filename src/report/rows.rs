//! Report row shapes and the formatting helpers they share.

use serde::Serialize;
use std::collections::BTreeMap;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One line of the storage usage report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageRow {
    pub project_id: String,
    pub dataset_id: String,
    pub table_name: String,
    pub table_type: String,
    pub region: String,
    pub total_rows: i64,
    pub logical_bytes: i64,
    pub physical_bytes: i64,
    pub logical_gb: f64,
    pub physical_gb: f64,
    pub method: String,
}

/// One line of the query history report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHistoryRow {
    pub job_id: String,
    pub user_email: String,
    pub created: String,
    pub ended: String,
    pub duration_sec: f64,
    pub bytes_billed: i64,
    pub bytes_processed: i64,
    pub cache_hit: bool,
    pub error_result: String,
    pub query_snippet: String,
}

/// One hourly slot usage data point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotRow {
    pub project_id: String,
    pub region: String,
    pub hour: String,
    pub avg_slots: f64,
    pub max_slot_sec: f64,
    pub labels: String,
}

pub fn bytes_to_gb(bytes: i64) -> f64 {
    round4(bytes as f64 / GIB)
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub fn round5(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Epoch milliseconds to RFC 3339 UTC
pub fn ms_to_rfc3339(ms: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339())
}

/// Timestamp cell for a report row; empty when the job never reached that
/// state.
pub fn ms_field(ms: Option<i64>) -> String {
    ms.and_then(ms_to_rfc3339).unwrap_or_default()
}

/// Wall-clock duration in seconds, zero when either endpoint is missing
pub fn duration_seconds(created_ms: Option<i64>, ended_ms: Option<i64>) -> f64 {
    match (created_ms, ended_ms) {
        (Some(created), Some(ended)) => (ended - created) as f64 / 1000.0,
        _ => 0.0,
    }
}

/// `key:value` pairs joined with `|`, sorted by key; `no-label` when empty
pub fn format_labels(labels: &BTreeMap<String, String>) -> String {
    if labels.is_empty() {
        return "no-label".to_string();
    }
    labels
        .iter()
        .map(|(key, value)| format!("{key}:{value}"))
        .collect::<Vec<_>>()
        .join("|")
}

/// First 1000 characters of a query with newlines flattened, so one query
/// stays one CSV record. Truncation is on character boundaries.
pub fn query_snippet(query: &str) -> String {
    query
        .chars()
        .take(1000)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_gb() {
        assert_eq!(bytes_to_gb(1_073_741_824), 1.0);
        assert_eq!(bytes_to_gb(536_870_912), 0.5);
        assert_eq!(bytes_to_gb(0), 0.0);
        // 100 MiB = 0.09765625 GiB, rounded to 4 places
        assert_eq!(bytes_to_gb(104_857_600), 0.0977);
    }

    #[test]
    fn test_rounding_helpers() {
        assert_eq!(round5(1.2345678), 1.23457);
        assert_eq!(round2(99.999), 100.0);
        assert_eq!(round4(0.00004), 0.0);
    }

    #[test]
    fn test_ms_to_rfc3339() {
        assert_eq!(
            ms_to_rfc3339(1_700_000_000_000).as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
        assert_eq!(ms_field(None), "");
    }

    #[test]
    fn test_duration_seconds() {
        assert_eq!(duration_seconds(Some(1_000), Some(6_500)), 5.5);
        assert_eq!(duration_seconds(Some(1_000), None), 0.0);
        assert_eq!(duration_seconds(None, None), 0.0);
    }

    #[test]
    fn test_format_labels_sorted_join() {
        let mut labels = BTreeMap::new();
        labels.insert("team".to_string(), "data".to_string());
        labels.insert("env".to_string(), "prod".to_string());
        assert_eq!(format_labels(&labels), "env:prod|team:data");
    }

    #[test]
    fn test_format_labels_empty() {
        assert_eq!(format_labels(&BTreeMap::new()), "no-label");
    }

    #[test]
    fn test_query_snippet_flattens_newlines() {
        assert_eq!(query_snippet("SELECT\n  1\nFROM x"), "SELECT   1 FROM x");
    }

    #[test]
    fn test_query_snippet_truncates_on_char_boundary() {
        let query: String = "é".repeat(1200);
        let snippet = query_snippet(&query);
        assert_eq!(snippet.chars().count(), 1000);
    }
}
