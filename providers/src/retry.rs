//! HTTP retry policy with exponential backoff.
//!
//! # Policy
//!
//! - Up to 2 retries (3 attempts in total)
//! - Backoff starts at 500ms, doubles per retry, capped at 8 seconds
//! - Down-jitter of up to 25% is applied to computed delays
//! - `retry-after-ms` / `retry-after` from the server win over computed delays
//!
//! # Retryable Conditions
//!
//! - HTTP 408, 409, 429, 5xx
//! - Connect, timeout and request-construction transport errors
//! - `x-should-retry` forces the decision either way
//!
//! Every attempt of one logical request carries the same `Idempotency-Key`.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, header::HeaderMap};
use uuid::Uuid;

/// Longest server-provided delay we are willing to honour.
const MAX_SERVER_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay that may be shaved off at random.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

fn within_server_bounds(delay: Duration) -> Option<Duration> {
    (delay > Duration::ZERO && delay < MAX_SERVER_DELAY).then_some(delay)
}

/// Delay requested by the server, if it sent a usable one.
#[must_use]
pub fn server_requested_delay(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let from_ms = header("retry-after-ms")
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms > 0.0)
        .and_then(|ms| within_server_bounds(Duration::from_secs_f64(ms / 1000.0)));
    if from_ms.is_some() {
        return from_ms;
    }

    header("retry-after")
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .and_then(|secs| within_server_bounds(Duration::from_secs(secs)))
}

/// Whether a non-success status is worth another attempt.
#[must_use]
pub fn is_retryable_status(status: StatusCode, headers: &HeaderMap) -> bool {
    let forced = headers
        .get("x-should-retry")
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase);
    match forced.as_deref() {
        Some("true") => return true,
        Some("false") => return false,
        _ => {}
    }

    matches!(status.as_u16(), 408 | 409 | 429) || status.is_server_error()
}

fn is_retryable_transport(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

/// Delay before retry number `retry` (0-based).
#[must_use]
pub fn backoff_delay(retry: u32, config: &RetryConfig, headers: Option<&HeaderMap>) -> Duration {
    if let Some(delay) = headers.and_then(server_requested_delay) {
        return delay;
    }

    let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
    let uncapped = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = uncapped.min(config.max_delay.as_secs_f64());
    let shave = rand::random::<f64>() * config.jitter_factor.clamp(0.0, 1.0);
    Duration::from_secs_f64(capped * (1.0 - shave))
}

#[must_use]
pub fn new_idempotency_key() -> String {
    format!("minicoder-{}", Uuid::new_v4())
}

/// How a retried request ended.
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success(Response),
    /// Non-2xx response that will not be retried further.
    HttpError(Response),
    /// Transport failure after at least one retry, or on the last attempt.
    ConnectionError {
        attempts: u32,
        source: reqwest::Error,
    },
    /// Transport failure on the first attempt that is not worth retrying.
    NonRetryable(reqwest::Error),
}

/// Send a request, rebuilding it for every attempt.
pub async fn send_with_retry<F>(build_request: F, config: &RetryConfig) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let idempotency_key = new_idempotency_key();
    let last_attempt = config.max_retries;

    let mut attempt = 0;
    loop {
        let request = build_request()
            .header("Idempotency-Key", &idempotency_key)
            .header("X-Retry-Count", attempt.to_string());
        let can_retry = attempt < last_attempt;

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                return RetryOutcome::Success(response);
            }
            Ok(response) => {
                let status = response.status();
                if !can_retry || !is_retryable_status(status, response.headers()) {
                    return RetryOutcome::HttpError(response);
                }
                let delay = backoff_delay(attempt, config, Some(response.headers()));
                tracing::debug!(
                    %status,
                    retry = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying model request after error status"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                if !is_retryable_transport(&error) && attempt == 0 {
                    return RetryOutcome::NonRetryable(error);
                }
                if !can_retry || !is_retryable_transport(&error) {
                    return RetryOutcome::ConnectionError {
                        attempts: attempt + 1,
                        source: error,
                    };
                }
                let delay = backoff_delay(attempt, config, None);
                tracing::debug!(
                    %error,
                    retry = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying model request after connection error"
                );
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        HeaderMap, RetryConfig, StatusCode, backoff_delay, is_retryable_status,
        server_requested_delay,
    };
    use reqwest::header::HeaderValue;
    use std::time::Duration;

    #[test]
    fn retry_after_ms_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after-ms", HeaderValue::from_static("1500"));
        headers.insert("retry-after", HeaderValue::from_static("9"));
        assert_eq!(
            server_requested_delay(&headers),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn retry_after_outside_bounds_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("120"));
        assert_eq!(server_requested_delay(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("0"));
        assert_eq!(server_requested_delay(&headers), None);
    }

    #[test]
    fn retryable_statuses() {
        let headers = HeaderMap::new();
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::CONFLICT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(is_retryable_status(status, &headers), "{status}");
        }
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::NOT_FOUND,
        ] {
            assert!(!is_retryable_status(status, &headers), "{status}");
        }
    }

    #[test]
    fn should_retry_header_overrides_status() {
        let mut headers = HeaderMap::new();
        headers.insert("x-should-retry", HeaderValue::from_static("TRUE"));
        assert!(is_retryable_status(StatusCode::BAD_REQUEST, &headers));

        headers.insert("x-should-retry", HeaderValue::from_static("false"));
        assert!(!is_retryable_status(StatusCode::TOO_MANY_REQUESTS, &headers));
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let config = RetryConfig::default();
        for _ in 0..50 {
            let first = backoff_delay(0, &config, None);
            assert!(first >= Duration::from_millis(375) && first <= Duration::from_millis(500));

            let second = backoff_delay(1, &config, None);
            assert!(second >= Duration::from_millis(750) && second <= Duration::from_secs(1));

            let huge = backoff_delay(30, &config, None);
            assert!(huge <= Duration::from_secs(8));
        }
    }

    #[test]
    fn backoff_prefers_server_delay() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        let delay = backoff_delay(0, &RetryConfig::default(), Some(&headers));
        assert_eq!(delay, Duration::from_secs(3));
    }
}
