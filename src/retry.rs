//! Retry-with-backoff policy shared by every external call.

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

/// Outcome of a failed attempt, telling the policy whether to try again.
#[derive(Debug)]
pub enum CallError {
    /// Rate limits, server errors, timeouts and dropped connections.
    Transient(anyhow::Error),
    /// Anything that will not improve by retrying.
    Fatal(anyhow::Error),
}

impl CallError {
    /// Classifies a non-success HTTP status returned by `service`.
    pub fn from_status(service: &str, status: StatusCode, body: String) -> Self {
        let err = anyhow::anyhow!("{} request failed ({}): {}", service, status, body);
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::Transient(err)
        } else {
            Self::Fatal(err)
        }
    }

    /// Classifies a transport-level `reqwest` failure.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let retryable =
            err.is_timeout() || err.is_connect() || err.is_body() || err.is_request();
        if retryable {
            Self::Transient(err.into())
        } else {
            Self::Fatal(err.into())
        }
    }

    fn into_inner(self) -> anyhow::Error {
        match self {
            Self::Transient(err) | Self::Fatal(err) => err,
        }
    }
}

/// Bounded exponential backoff applied to transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Builds a policy making at most `max_attempts` calls (at least one).
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: base_delay.saturating_mul(32),
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Total number of calls allowed, first attempt included.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        self.base_delay
            .saturating_mul(1 << capped)
            .min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails fatally, or the attempts run out.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Result<T, CallError>,
    {
        let mut attempt = 0usize;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(CallError::Transient(err)) if attempt + 1 < self.max_attempts => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        call = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    thread::sleep(delay);
                }
                Err(err) => return Err(err.into_inner()),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(8, Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(5), Duration::from_millis(3200));
        assert_eq!(policy.backoff(9), Duration::from_millis(3200));
    }

    #[test]
    fn retries_transient_failures_until_success() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = Cell::new(0);
        let value = policy
            .run("test", || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(CallError::Transient(anyhow::anyhow!("flaky")))
                } else {
                    Ok(42)
                }
            })
            .expect("third attempt succeeds");
        assert_eq!(value, 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let calls = Cell::new(0);
        let result: anyhow::Result<()> = policy.run("test", || {
            calls.set(calls.get() + 1);
            Err(CallError::Transient(anyhow::anyhow!("still down")))
        });
        assert!(result.unwrap_err().to_string().contains("still down"));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let calls = Cell::new(0);
        let result: anyhow::Result<()> = policy.run("test", || {
            calls.set(calls.get() + 1);
            Err(CallError::Fatal(anyhow::anyhow!("bad request")))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn classifies_http_statuses() {
        let transient = CallError::from_status("x", StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(matches!(transient, CallError::Transient(_)));
        let transient = CallError::from_status("x", StatusCode::BAD_GATEWAY, String::new());
        assert!(matches!(transient, CallError::Transient(_)));
        let fatal = CallError::from_status("x", StatusCode::BAD_REQUEST, "nope".into());
        assert!(matches!(fatal, CallError::Fatal(_)));
    }
}
