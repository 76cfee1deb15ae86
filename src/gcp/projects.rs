//! Cloud Resource Manager v3: project discovery

use super::client::BqClient;
use super::http::ApiError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Project metadata from `projects:search`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub project_id: String,
    pub display_name: String,
    pub state: String,
    pub labels: BTreeMap<String, String>,
}

impl From<&Value> for Project {
    fn from(value: &Value) -> Self {
        let labels = value
            .get("labels")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            project_id: value
                .get("projectId")
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string(),
            display_name: value
                .get("displayName")
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string(),
            state: value
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string(),
            labels,
        }
    }
}

/// Search filter for active projects under an organization or folder.
pub fn scope_query(parent: &str) -> String {
    format!("parent:{parent} state:ACTIVE")
}

/// List all active projects under `parent` (auto-paginate).
pub async fn search_projects(client: &BqClient, parent: &str) -> Result<Vec<Project>, ApiError> {
    let url = client.resourcemanager_url("projects:search");
    let query = scope_query(parent);
    let mut projects = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut params: Vec<(&str, String)> = vec![("query", query.clone())];
        if let Some(token) = &page_token {
            params.push(("pageToken", token.clone()));
        }

        let response = client.get(&url, &params).await?;

        if let Some(items) = response.get("projects").and_then(Value::as_array) {
            projects.extend(items.iter().map(Project::from));
        }

        match response.get("nextPageToken").and_then(Value::as_str) {
            Some(token) => page_token = Some(token.to_string()),
            None => break,
        }
    }

    tracing::debug!(parent, count = projects.len(), "project search complete");
    Ok(projects)
}
