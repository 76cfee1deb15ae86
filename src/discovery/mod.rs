//! Target selection: which projects a sweep visits.
//!
//! Discovery asks Resource Manager for every active project under a parent
//! scope, then folds in the configured fallback list so projects the search
//! cannot see (missing permissions, other orgs) are still swept.

pub mod regions;

use crate::gcp::http::format_gcp_error;
use crate::gcp::projects::{self, Project};
use crate::gcp::BqClient;
use std::collections::{BTreeMap, HashSet};

/// Where a target came from; affects nothing but logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetSource {
    Discovered,
    Fallback,
}

/// One project selected for sweeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub project_id: String,
    pub labels: BTreeMap<String, String>,
    pub source: TargetSource,
}

/// Search for active projects under `parent` and merge in the fallback list.
///
/// A failed search degrades to the fallback list alone; the sweep still runs.
pub async fn discover_targets(
    client: &BqClient,
    parent: &str,
    fallback: &[String],
) -> Vec<Target> {
    let discovered = match projects::search_projects(client, parent).await {
        Ok(found) => {
            tracing::info!(parent, count = found.len(), "discovered projects");
            found
        }
        Err(err) => {
            tracing::warn!(
                parent,
                error = %format_gcp_error(&err),
                "project discovery failed, continuing with fallback list"
            );
            Vec::new()
        }
    };

    merge_targets(discovered, fallback)
}

/// Merge discovered projects with the fallback list.
///
/// Discovered projects keep their search order and labels; fallback entries
/// follow in list order, without labels, and never shadow a discovered
/// project. The output is fully determined by the inputs.
pub fn merge_targets(discovered: Vec<Project>, fallback: &[String]) -> Vec<Target> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut targets = Vec::new();

    for project in discovered {
        if seen.insert(project.project_id.clone()) {
            targets.push(Target {
                project_id: project.project_id,
                labels: project.labels,
                source: TargetSource::Discovered,
            });
        }
    }

    for project_id in fallback {
        if seen.insert(project_id.clone()) {
            targets.push(Target {
                project_id: project_id.clone(),
                labels: BTreeMap::new(),
                source: TargetSource::Fallback,
            });
        }
    }

    targets
}
