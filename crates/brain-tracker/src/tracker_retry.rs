//! Retry policy for tracker GraphQL calls.
//!
//! Rate limiting reaches the client two ways: HTTP 429, or HTTP 400 whose
//! GraphQL error carries `extensions.code == "RATELIMITED"`. Both are retried,
//! as are 5xx responses, connect failures and timeouts. Every wait, including
//! one requested through `Retry-After`, is capped at [`MAX_RETRY_DELAY`] so a
//! poll pass never stalls on a single tag for longer than that.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;

pub(crate) const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const RATE_LIMITED_CODE: &str = "RATELIMITED";
const MAX_ERROR_BODY_CHARS: usize = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn new(max_attempts: usize, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms.max(1)),
        }
    }

    /// Wait before the next attempt after a non-success response, or `None` to give up.
    pub(crate) fn after_status(
        &self,
        attempt: usize,
        status: StatusCode,
        headers: &HeaderMap,
        body: &str,
    ) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let retryable = status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
            || (status == StatusCode::BAD_REQUEST && is_rate_limited_body(body));
        retryable.then(|| self.backoff(attempt, retry_after(headers)))
    }

    /// Wait before the next attempt after a transport failure, or `None` to give up.
    pub(crate) fn after_transport_error(
        &self,
        attempt: usize,
        error: &reqwest::Error,
    ) -> Option<Duration> {
        if attempt >= self.max_attempts || !(error.is_timeout() || error.is_connect()) {
            return None;
        }
        Some(self.backoff(attempt, None))
    }

    fn backoff(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        let delay = match retry_after {
            Some(requested) => requested.max(self.base_delay),
            None => {
                let exponent = attempt.saturating_sub(1).min(10) as u32;
                self.base_delay.saturating_mul(2_u32.saturating_pow(exponent))
            }
        };
        delay.min(MAX_RETRY_DELAY)
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

fn is_rate_limited_body(body: &str) -> bool {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    parsed
        .get("errors")
        .and_then(Value::as_array)
        .is_some_and(|errors| {
            errors.iter().any(|error| {
                error.pointer("/extensions/code").and_then(Value::as_str) == Some(RATE_LIMITED_CODE)
            })
        })
}

/// Clips a response body for inclusion in an error message.
pub(crate) fn clip_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut clipped = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>();
    clipped.push_str("...");
    clipped
}
