//! Property tests for report shaping and target selection: snippet and
//! label formatting, gigabyte rounding, timestamp fields, and the merge
//! and grouping rules the sweeps rely on for deterministic output.

use std::collections::{BTreeMap, HashSet};

use bqsweep::discovery::regions::group_by_region;
use bqsweep::discovery::{merge_targets, TargetSource};
use bqsweep::gcp::bigquery::Dataset;
use bqsweep::gcp::projects::Project;
use bqsweep::report::rows::{
    bytes_to_gb, duration_seconds, format_labels, ms_to_rfc3339, query_snippet,
};
use proptest::prelude::*;
use serde_json::json;

fn arb_project_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{4,12}"
}

fn arb_labels() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..4)
}

fn arb_query_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![4 => any::<char>(), 1 => Just('\n')],
        0..1500,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

fn arb_projects() -> impl Strategy<Value = Vec<Project>> {
    prop::collection::vec((arb_project_id(), arb_labels()), 0..8).prop_map(|specs| {
        specs
            .into_iter()
            .map(|(project_id, labels)| Project {
                display_name: project_id.clone(),
                project_id,
                state: "ACTIVE".to_string(),
                labels,
            })
            .collect()
    })
}

fn arb_location() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        "(US|EU|asia-northeast1|us-central1|europe-west2)".prop_map(Some),
    ]
}

fn arb_datasets() -> impl Strategy<Value = Vec<Dataset>> {
    prop::collection::vec(("[a-z][a-z0-9_]{2,10}", arb_location()), 0..12).prop_map(|specs| {
        specs
            .into_iter()
            .map(|(dataset_id, location)| {
                serde_json::from_value(json!({
                    "datasetReference": {"projectId": "prop-proj", "datasetId": dataset_id},
                    "location": location,
                }))
                .expect("minimal dataset json")
            })
            .collect()
    })
}

mod snippet_props {
    use super::*;

    proptest! {
        /// Snippets never exceed 1000 characters regardless of input.
        #[test]
        fn prop_snippet_is_bounded(query in arb_query_text()) {
            prop_assert!(query_snippet(&query).chars().count() <= 1000);
        }

        /// Newlines are flattened so a snippet stays one CSV record.
        #[test]
        fn prop_snippet_has_no_newlines(query in arb_query_text()) {
            prop_assert!(!query_snippet(&query).contains('\n'));
        }

        /// Every kept character matches the source, modulo flattening.
        #[test]
        fn prop_snippet_preserves_prefix(query in arb_query_text()) {
            let snippet = query_snippet(&query);
            for (got, want) in snippet.chars().zip(query.chars()) {
                if want == '\n' {
                    prop_assert_eq!(got, ' ');
                } else {
                    prop_assert_eq!(got, want);
                }
            }
        }
    }
}

mod label_props {
    use super::*;

    proptest! {
        /// Exactly the empty map produces the `no-label` marker.
        #[test]
        fn prop_no_label_iff_empty(labels in arb_labels()) {
            prop_assert_eq!(format_labels(&labels) == "no-label", labels.is_empty());
        }

        /// Every pair appears once, joined with `|` in key order.
        #[test]
        fn prop_labels_sorted_and_complete(labels in arb_labels()) {
            prop_assume!(!labels.is_empty());
            let formatted = format_labels(&labels);
            let parts: Vec<&str> = formatted.split('|').collect();

            prop_assert_eq!(parts.len(), labels.len());
            let keys: Vec<&str> = parts
                .iter()
                .map(|part| part.split(':').next().unwrap_or(""))
                .collect();
            prop_assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));
            for (key, value) in &labels {
                let pair = format!("{key}:{value}");
                prop_assert!(parts.contains(&pair.as_str()));
            }
        }
    }
}

mod target_props {
    use super::*;

    proptest! {
        /// Merged targets are unique and drawn only from the inputs.
        #[test]
        fn prop_merge_is_unique_and_grounded(
            discovered in arb_projects(),
            fallback in prop::collection::vec(arb_project_id(), 0..8),
        ) {
            let known: HashSet<&str> = discovered
                .iter()
                .map(|p| p.project_id.as_str())
                .chain(fallback.iter().map(String::as_str))
                .collect();

            let targets = merge_targets(discovered.clone(), &fallback);
            let ids: HashSet<&str> = targets.iter().map(|t| t.project_id.as_str()).collect();

            prop_assert_eq!(ids.len(), targets.len());
            prop_assert!(targets.iter().all(|t| known.contains(t.project_id.as_str())));
        }

        /// No input project is lost, and discovered entries keep their
        /// search order ahead of every fallback entry.
        #[test]
        fn prop_merge_covers_inputs_in_order(
            discovered in arb_projects(),
            fallback in prop::collection::vec(arb_project_id(), 0..8),
        ) {
            let targets = merge_targets(discovered.clone(), &fallback);
            let ids: Vec<&str> = targets.iter().map(|t| t.project_id.as_str()).collect();

            for project in &discovered {
                prop_assert!(ids.contains(&project.project_id.as_str()));
            }
            for project_id in &fallback {
                prop_assert!(ids.contains(&project_id.as_str()));
            }

            // Discovered targets form a prefix, deduplicated but in order
            let mut expected_prefix: Vec<&str> = Vec::new();
            for project in &discovered {
                if !expected_prefix.contains(&project.project_id.as_str()) {
                    expected_prefix.push(project.project_id.as_str());
                }
            }
            let discovered_ids: Vec<&str> = targets
                .iter()
                .take_while(|t| t.source == TargetSource::Discovered)
                .map(|t| t.project_id.as_str())
                .collect();
            prop_assert_eq!(discovered_ids, expected_prefix);
        }
    }
}

mod region_props {
    use super::*;

    proptest! {
        /// Grouping never loses a dataset, and each one lands under its own
        /// location, with missing or blank locations defaulting to US.
        #[test]
        fn prop_grouping_preserves_and_buckets(datasets in arb_datasets()) {
            let total = datasets.len();
            let grouped = group_by_region(datasets);

            let count: usize = grouped.values().map(Vec::len).sum();
            prop_assert_eq!(count, total);

            for (region, members) in &grouped {
                for dataset in members {
                    let expected = match dataset.location.as_deref() {
                        Some(location) if !location.is_empty() => location,
                        _ => "US",
                    };
                    prop_assert_eq!(region.as_str(), expected);
                }
            }
        }
    }
}

mod row_math_props {
    use super::*;

    proptest! {
        /// Gigabyte figures carry at most four decimal places and sit within
        /// half a rounding unit of the exact value.
        #[test]
        fn prop_bytes_to_gb_rounds_to_four_places(bytes in 0i64..=1_099_511_627_776) {
            let gb = bytes_to_gb(bytes);
            let scaled = gb * 10_000.0;
            prop_assert!((scaled - scaled.round()).abs() < 1e-6);

            let exact = bytes as f64 / (1024.0 * 1024.0 * 1024.0);
            prop_assert!((gb - exact).abs() <= 0.00005 + 1e-9);
        }

        /// Timestamps survive the trip through RFC 3339.
        #[test]
        fn prop_ms_to_rfc3339_round_trips(ms in 0i64..=4_102_444_800_000) {
            let formatted = ms_to_rfc3339(ms).expect("in range");
            let parsed = chrono::DateTime::parse_from_rfc3339(&formatted)
                .expect("output should parse");
            prop_assert_eq!(parsed.timestamp_millis(), ms);
        }

        /// Durations are exact millisecond conversions when both endpoints
        /// exist and zero otherwise.
        #[test]
        fn prop_duration_requires_both_endpoints(
            created in 0i64..=2_000_000_000_000,
            delta in 0i64..=500_000,
        ) {
            let ended = created + delta;
            prop_assert_eq!(
                duration_seconds(Some(created), Some(ended)),
                delta as f64 / 1000.0
            );
            prop_assert_eq!(duration_seconds(Some(created), None), 0.0);
            prop_assert_eq!(duration_seconds(None, Some(ended)), 0.0);
        }
    }
}
