//! Retry logic for Envirofacts requests with status classification.

use std::future::Future;

use log::{debug, warn};
use reqwest::StatusCode;

use super::transport::HttpResponse;
use crate::config::BackoffPolicy;
use crate::error::{PermanentError, Result, TransientError, TriError};

/// Longest body excerpt carried in a client error.
const BODY_SNIPPET_LEN: usize = 200;

/// Classifies a response by status. 2xx passes through untouched, 5xx and
/// 429 are transient, every other status is permanent.
pub fn classify_response(url: &str, response: HttpResponse) -> Result<HttpResponse> {
    let status = StatusCode::from_u16(response.status).map_err(|_| {
        PermanentError::Decode(format!("Invalid HTTP status {}", response.status))
    })?;

    match status {
        s if s.is_success() => Ok(response),
        StatusCode::TOO_MANY_REQUESTS => Err(TransientError::RateLimited {
            retry_after: response.retry_after,
        }
        .into()),
        s if s.is_server_error() => Err(TransientError::Server(s.as_u16()).into()),
        StatusCode::NOT_FOUND => Err(PermanentError::NotFound(url.to_string()).into()),
        s => Err(PermanentError::ClientError {
            status: s.as_u16(),
            body: snippet(&response.body),
        }
        .into()),
    }
}

fn snippet(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Server-suggested wait carried by a transient error, if any.
fn server_hint(error: &TriError) -> Option<std::time::Duration> {
    match error {
        TriError::Transient(TransientError::RateLimited { retry_after }) => *retry_after,
        _ => None,
    }
}

/// Runs `operation` once, then up to `max_retries` more times while it fails
/// transiently. Permanent errors return immediately; exhausting the retries
/// returns the last transient error.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    max_retries: u32,
    backoff: &BackoffPolicy,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = max_retries.saturating_add(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => {
                debug!("{}: non-retryable error: {}", operation_name, e);
                return Err(e);
            }
            Err(e) if attempt >= attempts => {
                warn!(
                    "{}: giving up after {} attempts ({})",
                    operation_name, attempts, e
                );
                return Err(e);
            }
            Err(e) => {
                let delay = backoff.delay(attempt, server_hint(&e));
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                    operation_name,
                    attempt,
                    attempts,
                    e,
                    delay.as_millis()
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn response(status: u16) -> HttpResponse {
        HttpResponse::new(status, "")
    }

    #[test]
    fn test_classify_success() {
        let ok = classify_response("u", HttpResponse::new(200, "[]")).unwrap();
        assert_eq!(ok.body, "[]");
    }

    #[test]
    fn test_classify_server_errors_are_transient() {
        for status in [500, 502, 503, 504] {
            let err = classify_response("u", response(status)).unwrap_err();
            assert_eq!(err, TriError::Transient(TransientError::Server(status)));
        }
    }

    #[test]
    fn test_classify_rate_limit_is_transient() {
        let mut resp = response(429);
        resp.retry_after = Some(Duration::from_secs(2));
        let err = classify_response("u", resp).unwrap_err();
        assert_eq!(
            err,
            TriError::Transient(TransientError::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            })
        );
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify_response("http://x/TRI_NOPE/JSON", response(404)).unwrap_err();
        assert!(matches!(
            err,
            TriError::Permanent(PermanentError::NotFound(ref u)) if u.contains("TRI_NOPE")
        ));
    }

    #[test]
    fn test_classify_other_client_errors() {
        for status in [400, 401, 403, 422] {
            let err = classify_response("u", HttpResponse::new(status, "nope")).unwrap_err();
            assert_eq!(
                err,
                TriError::Permanent(PermanentError::ClientError {
                    status,
                    body: "nope".to_string()
                })
            );
        }
    }

    #[test]
    fn test_snippet_truncates_long_bodies() {
        let body = "x".repeat(1000);
        let s = snippet(&body);
        assert_eq!(s.len(), BODY_SNIPPET_LEN + 3);
        assert!(s.ends_with("..."));
        assert_eq!(snippet("  short \n"), "short");
    }

    #[tokio::test]
    async fn test_with_retry_success() {
        let result = with_retry("test", 3, &BackoffPolicy::immediate(), || async {
            Ok::<_, TriError>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_retry_immediate_failure_on_permanent() {
        let attempts = Arc::new(AtomicUsize::new(0));

        let result = with_retry("test", 5, &BackoffPolicy::immediate(), || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TriError::from(PermanentError::NotFound("x".into())))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient() {
        let attempts = Arc::new(AtomicUsize::new(0));

        let result = with_retry("test", 3, &BackoffPolicy::immediate(), || {
            let attempts = Arc::clone(&attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TriError::from(TransientError::Connect("reset".into())))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));

        let result = with_retry("test", 2, &BackoffPolicy::immediate(), || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TriError::from(TransientError::Server(500)))
            }
        })
        .await;

        assert_eq!(
            result.unwrap_err(),
            TriError::Transient(TransientError::Server(500))
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_zero_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));

        let result = with_retry("test", 0, &BackoffPolicy::immediate(), || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TriError::from(TransientError::Timeout("slow".into())))
            }
        })
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_honors_retry_after() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let policy = BackoffPolicy {
            initial: Duration::from_millis(1),
            multiplier: 2,
            max: Duration::from_secs(60),
            jitter: false,
        };

        let start = tokio::time::Instant::now();
        let result = with_retry("test", 1, &policy, || {
            let attempts = Arc::clone(&attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TriError::from(TransientError::RateLimited {
                        retry_after: Some(Duration::from_secs(10)),
                    }))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert!(start.elapsed() >= Duration::from_secs(10));
    }
}
