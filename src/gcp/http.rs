//! HTTP utilities for GCP REST API calls

use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Error returned by the GCP REST layer.
///
/// Keeps the HTTP status around so callers can branch on access-denied /
/// not-found classes without string matching.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse response JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ApiError {
    /// Missing IAM permission on the addressed resource. A 401 is excluded:
    /// stale credentials are a caller problem, not a property of the target.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, ApiError::Api { status: 403, .. })
    }

    /// The addressed resource does not exist (often: BigQuery not enabled
    /// in the project, or no data in the queried region).
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Api { status: 404, .. })
    }
}

/// Sanitize response body for logging
/// Truncates long responses and masks potentially sensitive patterns
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... [truncated, {} bytes total]",
            &body[..end],
            body.len()
        )
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull the human-readable message out of a GCP error body.
///
/// GCP APIs wrap errors as `{"error": {"code": ..., "message": ...}}`;
/// fall back to the sanitized raw body when the shape differs.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| sanitize_for_log(body))
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("bqsweep/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Make a GET request to a GCP API
    pub async fn get(
        &self,
        url: &str,
        token: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .query(params)
            .bearer_auth(token)
            .send()
            .await?;

        Self::read_json(response).await
    }

    /// Make a POST request with a JSON body to a GCP API
    pub async fn post(&self, url: &str, token: &str, body: &Value) -> Result<Value, ApiError> {
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        Self::read_json(response).await
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Only log the sanitized/truncated body to avoid leaking sensitive data
            tracing::debug!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Format a GCP API error for display
/// Sanitizes error messages to avoid leaking raw API details in summaries.
pub fn format_gcp_error(error: &ApiError) -> String {
    match error {
        ApiError::Api { status, .. } => match StatusCode::from_u16(*status).ok() {
            Some(StatusCode::FORBIDDEN) => {
                "Permission denied. Check your GCP IAM permissions.".to_string()
            }
            Some(StatusCode::UNAUTHORIZED) => {
                "Authentication failed. Run 'gcloud auth application-default login'.".to_string()
            }
            Some(StatusCode::NOT_FOUND) => "Resource not found.".to_string(),
            Some(StatusCode::TOO_MANY_REQUESTS) => {
                "Rate limit exceeded. Please try again later.".to_string()
            }
            Some(StatusCode::BAD_REQUEST) => "Invalid request. Check your parameters.".to_string(),
            _ => format!("Request failed with status {}.", status),
        },
        ApiError::Transport(_) => {
            "Request failed. Check your network connection and try again.".to_string()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16) -> ApiError {
        ApiError::Api {
            status,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_access_denied_classification() {
        assert!(api_error(403).is_access_denied());
        assert!(!api_error(401).is_access_denied());
        assert!(!api_error(404).is_access_denied());
        assert!(!api_error(500).is_access_denied());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(403).is_not_found());
    }

    #[test]
    fn test_error_message_extracts_gcp_shape() {
        let body = r#"{"error": {"code": 403, "message": "Access Denied: Table x"}}"#;
        assert_eq!(error_message(body), "Access Denied: Table x");
    }

    #[test]
    fn test_error_message_falls_back_to_raw_body() {
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let long = "x".repeat(500);
        let out = sanitize_for_log(&long);
        assert!(out.contains("truncated"));
        assert!(out.len() < 300);
    }

    #[test]
    fn test_sanitize_cuts_multibyte_text_on_a_char_boundary() {
        // 'é' is two bytes and straddles the truncation offset
        let body = format!("{}étage de passerelle indisponible", "x".repeat(199));
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(199)));
        assert!(out.contains("truncated"));
    }

    #[test]
    fn test_error_message_survives_long_non_ascii_error_page() {
        // proxies answer with HTML, not the GCP JSON shape
        let body = format!("<html>{}étage</html>", "x".repeat(193));
        let msg = error_message(&body);
        assert!(msg.starts_with("<html>"));
        assert!(msg.contains("truncated"));
    }

    #[test]
    fn test_format_gcp_error_is_generic_for_403() {
        let msg = format_gcp_error(&api_error(403));
        assert!(msg.contains("Permission denied"));
        assert!(!msg.contains("boom"));
    }
}
