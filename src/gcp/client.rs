//! GCP Client
//!
//! Project-scoped client for the BigQuery and Resource Manager REST APIs,
//! combining authentication and HTTP functionality.

use super::auth::Credentials;
use super::http::{ApiError, HttpClient};
use serde_json::Value;

/// Production BigQuery v2 endpoint
pub const BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Production Resource Manager v3 endpoint
pub const RESOURCEMANAGER_ENDPOINT: &str = "https://cloudresourcemanager.googleapis.com/v3";

/// Main GCP client
#[derive(Clone)]
pub struct BqClient {
    pub credentials: Credentials,
    pub http: HttpClient,
    pub project_id: String,
    bigquery_endpoint: String,
    resourcemanager_endpoint: String,
}

impl BqClient {
    /// Create a new client against the production endpoints using
    /// Application Default Credentials.
    pub async fn new(project_id: &str) -> Result<Self, ApiError> {
        let credentials = Credentials::adc().await?;
        Self::with_endpoints(
            project_id,
            credentials,
            BIGQUERY_ENDPOINT,
            RESOURCEMANAGER_ENDPOINT,
        )
    }

    /// Create a client with explicit credentials and endpoints.
    ///
    /// Endpoint overrides exist so tests can point the client at a local
    /// mock server; production callers use [`BqClient::new`].
    pub fn with_endpoints(
        project_id: &str,
        credentials: Credentials,
        bigquery_endpoint: &str,
        resourcemanager_endpoint: &str,
    ) -> Result<Self, ApiError> {
        let http = HttpClient::new()?;

        Ok(Self {
            credentials,
            http,
            project_id: project_id.to_string(),
            bigquery_endpoint: bigquery_endpoint.trim_end_matches('/').to_string(),
            resourcemanager_endpoint: resourcemanager_endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Clone this client scoped to a different project.
    ///
    /// Credentials and connection pool are shared; only the project used in
    /// request URLs changes.
    pub fn for_project(&self, project_id: &str) -> Self {
        let mut client = self.clone();
        client.project_id = project_id.to_string();
        client
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String, ApiError> {
        self.credentials.token().await
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str, params: &[(&str, String)]) -> Result<Value, ApiError> {
        let token = self.get_token().await?;
        self.http.get(url, &token, params).await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, body: &Value) -> Result<Value, ApiError> {
        let token = self.get_token().await?;
        self.http.post(url, &token, body).await
    }

    // =========================================================================
    // BigQuery API helpers
    // =========================================================================

    /// Build a BigQuery v2 URL scoped to the current project
    pub fn bigquery_url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/{}",
            self.bigquery_endpoint, self.project_id, path
        )
    }

    /// Build a BigQuery v2 dataset URL
    pub fn dataset_url(&self, dataset_id: &str) -> String {
        self.bigquery_url(&format!("datasets/{}", dataset_id))
    }

    /// Build a BigQuery v2 table listing/detail URL
    pub fn tables_url(&self, dataset_id: &str, table_id: Option<&str>) -> String {
        match table_id {
            Some(table) => self.bigquery_url(&format!("datasets/{}/tables/{}", dataset_id, table)),
            None => self.bigquery_url(&format!("datasets/{}/tables", dataset_id)),
        }
    }

    // =========================================================================
    // Resource Manager API helpers
    // =========================================================================

    /// Build a Resource Manager v3 URL
    pub fn resourcemanager_url(&self, path: &str) -> String {
        format!("{}/{}", self.resourcemanager_endpoint, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> BqClient {
        BqClient::with_endpoints(
            "demo-project",
            Credentials::fixed("t"),
            BIGQUERY_ENDPOINT,
            RESOURCEMANAGER_ENDPOINT,
        )
        .unwrap()
    }

    #[test]
    fn test_bigquery_urls() {
        let client = test_client();
        assert_eq!(
            client.bigquery_url("queries"),
            "https://bigquery.googleapis.com/bigquery/v2/projects/demo-project/queries"
        );
        assert_eq!(
            client.tables_url("sales", None),
            "https://bigquery.googleapis.com/bigquery/v2/projects/demo-project/datasets/sales/tables"
        );
        assert_eq!(
            client.tables_url("sales", Some("orders")),
            "https://bigquery.googleapis.com/bigquery/v2/projects/demo-project/datasets/sales/tables/orders"
        );
    }

    #[test]
    fn test_for_project_swaps_only_the_project() {
        let client = test_client().for_project("other-project");
        assert_eq!(
            client.dataset_url("d1"),
            "https://bigquery.googleapis.com/bigquery/v2/projects/other-project/datasets/d1"
        );
        assert_eq!(
            client.resourcemanager_url("projects:search"),
            "https://cloudresourcemanager.googleapis.com/v3/projects:search"
        );
    }
}
