//! Fast/slow scan selection.
//!
//! Storage sweeps prefer one aggregate `INFORMATION_SCHEMA` query per region
//! (fast) and fall back to per-table API iteration (slow) when the fast scan
//! is denied, errors out, or legitimately returns nothing. The fast result is
//! classified up front so the two paths never interleave.

use crate::gcp::http::format_gcp_error;
use crate::gcp::ApiError;
use std::future::Future;

/// How a scope's rows were obtained; recorded in the report's `method` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    Fast,
    Fallback,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMethod::Fast => "INFORMATION_SCHEMA",
            FetchMethod::Fallback => "API_FALLBACK",
        }
    }
}

/// Verdict on the fast scan, decided before any fallback work starts.
#[derive(Debug)]
pub enum FastOutcome<T> {
    /// Fast scan answered with rows; it is authoritative for this scope.
    Rows(Vec<T>),
    /// Fast scan succeeded but saw nothing; the slow scan gets a chance to
    /// find what the aggregate view does not cover.
    Empty,
    /// Fast scan failed (commonly a permission gap on the aggregate view).
    Unavailable(ApiError),
}

/// Classify a fast-scan result into its three possible verdicts.
pub fn classify<T>(result: Result<Vec<T>, ApiError>) -> FastOutcome<T> {
    match result {
        Ok(rows) if rows.is_empty() => FastOutcome::Empty,
        Ok(rows) => FastOutcome::Rows(rows),
        Err(err) => FastOutcome::Unavailable(err),
    }
}

/// Fetch one scope, trying `fast` first and running `slow` only when the
/// fast scan yields nothing usable. Both futures are built lazily by the
/// caller; `slow` is never polled when the fast path wins.
pub async fn fetch_scope<T, FastFut, SlowFut>(
    scope: &str,
    fast: FastFut,
    slow: SlowFut,
) -> Result<(Vec<T>, FetchMethod), ApiError>
where
    FastFut: Future<Output = Result<Vec<T>, ApiError>>,
    SlowFut: Future<Output = Result<Vec<T>, ApiError>>,
{
    match classify(fast.await) {
        FastOutcome::Rows(rows) => Ok((rows, FetchMethod::Fast)),
        FastOutcome::Empty => {
            tracing::info!(scope, "fast scan returned no rows, running granular scan");
            Ok((slow.await?, FetchMethod::Fallback))
        }
        FastOutcome::Unavailable(err) => {
            tracing::info!(
                scope,
                error = %format_gcp_error(&err),
                "fast scan unavailable, switching to granular scan"
            );
            Ok((slow.await?, FetchMethod::Fallback))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied() -> ApiError {
        ApiError::Api {
            status: 403,
            message: "Access Denied".to_string(),
        }
    }

    #[test]
    fn test_classify_rows() {
        match classify(Ok(vec![1, 2])) {
            FastOutcome::Rows(rows) => assert_eq!(rows, vec![1, 2]),
            other => panic!("expected Rows, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_empty() {
        assert!(matches!(
            classify::<i32>(Ok(Vec::new())),
            FastOutcome::Empty
        ));
    }

    #[test]
    fn test_classify_error() {
        assert!(matches!(
            classify::<i32>(Err(denied())),
            FastOutcome::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_scope_fast_wins_and_slow_is_not_polled() {
        let slow = async {
            panic!("slow path must not run when fast has rows");
        };
        let (rows, method) = fetch_scope("us", async { Ok(vec![10]) }, slow)
            .await
            .unwrap();
        assert_eq!(rows, vec![10]);
        assert_eq!(method, FetchMethod::Fast);
    }

    #[tokio::test]
    async fn test_fetch_scope_empty_fast_falls_back() {
        let (rows, method) = fetch_scope("us", async { Ok(Vec::new()) }, async {
            Ok(vec![7])
        })
        .await
        .unwrap();
        assert_eq!(rows, vec![7]);
        assert_eq!(method, FetchMethod::Fallback);
    }

    #[tokio::test]
    async fn test_fetch_scope_failed_fast_falls_back() {
        let (rows, method) = fetch_scope("eu", async { Err(denied()) }, async { Ok(vec![3]) })
            .await
            .unwrap();
        assert_eq!(rows, vec![3]);
        assert_eq!(method, FetchMethod::Fallback);
    }

    #[test]
    fn test_method_labels() {
        assert_eq!(FetchMethod::Fast.as_str(), "INFORMATION_SCHEMA");
        assert_eq!(FetchMethod::Fallback.as_str(), "API_FALLBACK");
    }
}
