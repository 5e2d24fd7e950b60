//! Timeout and retry policy for network operations.

use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{error, warn};

use crate::api::transport::{HttpRequest, Transport};
use crate::config::Config;
use crate::error::RequestError;

/// How many times to try, how long each try may take, and how long to wait
/// between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Zero behaves as one.
    pub attempts: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.retry_attempts,
            base_delay: config.retry_delay(),
            timeout: config.request_timeout(),
        }
    }

    /// Delay after the `attempt`-th failure: proportional to the attempt number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Settled result of a network operation, shared by every waiter.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub result: Result<Value, RequestError>,
    /// Attempts beyond the first
    pub retries: u32,
}

/// Runs `request` until it succeeds or the attempts are exhausted.
///
/// Each attempt has its own timeout; a timed-out attempt is dropped
/// (cancelling the call) and counts as a failure like any other.
/// Non-2xx statuses are failures.
pub async fn execute(transport: &dyn Transport, request: &HttpRequest, policy: &RetryPolicy) -> Outcome {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = match timeout(policy.timeout, transport.send(request.clone())).await {
            Ok(Ok(response)) if response.is_success() => Ok(response.body),
            Ok(Ok(response)) => Err(RequestError::Status {
                status: response.status,
                reason: response.reason,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RequestError::Timeout(policy.timeout.as_millis() as u64)),
        };

        match result {
            Ok(body) => {
                return Outcome {
                    result: Ok(body),
                    retries: attempt - 1,
                }
            }
            Err(e) if attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    url = request.url.as_str(),
                    "Attempt {} failed ({}), retrying in {} ms",
                    attempt,
                    e,
                    delay.as_millis()
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    url = request.url.as_str(),
                    "Request failed after {} attempts: {}", attempt, e
                );
                return Outcome {
                    result: Err(e),
                    retries: attempt - 1,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::HttpResponse;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::Method;
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    /// Replays a script of responses; `None` hangs forever.
    struct Scripted {
        script: Mutex<VecDeque<Option<Result<HttpResponse, RequestError>>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(script: Vec<Option<Result<HttpResponse, RequestError>>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, RequestError> {
            *self.calls.lock() += 1;
            let next = self.script.lock().pop_front().flatten();
            match next {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }

    fn request() -> HttpRequest {
        HttpRequest {
            method: Method::GET,
            url: "https://api.test/languages".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1_000),
            timeout: Duration::from_millis(30_000),
        }
    }

    fn server_error() -> Option<Result<HttpResponse, RequestError>> {
        Some(Ok(HttpResponse {
            status: 503,
            reason: "Service Unavailable".to_string(),
            body: Value::Null,
        }))
    }

    #[test]
    fn test_delay_grows_with_attempt() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let transport = Scripted::new(vec![
            server_error(),
            Some(Err(RequestError::Transport("connection reset".to_string()))),
            Some(Ok(HttpResponse::ok(json!(["yua"])))),
        ]);
        let started = Instant::now();

        let outcome = execute(&transport, &request(), &policy()).await;

        assert_eq!(outcome.result, Ok(json!(["yua"])));
        assert_eq!(outcome.retries, 2);
        assert_eq!(transport.calls(), 3);
        // 1s after the first failure, 2s after the second
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_surface_last_error() {
        let transport = Scripted::new(vec![server_error(), server_error(), server_error(), server_error()]);

        let outcome = execute(&transport, &request(), &policy()).await;

        assert_eq!(
            outcome.result,
            Err(RequestError::Status {
                status: 503,
                reason: "Service Unavailable".to_string()
            })
        );
        assert_eq!(outcome.retries, 2);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_only_the_attempt() {
        let transport = Scripted::new(vec![None, Some(Ok(HttpResponse::ok(json!("late"))))]);

        let outcome = execute(&transport, &request(), &policy()).await;

        assert_eq!(outcome.result, Ok(json!("late")));
        assert_eq!(outcome.retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_times_out() {
        let transport = Scripted::new(vec![None, None, None]);

        let outcome = execute(&transport, &request(), &policy()).await;

        assert_eq!(outcome.result, Err(RequestError::Timeout(30_000)));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let transport = Scripted::new(vec![Some(Ok(HttpResponse::ok(json!(1))))]);
        let policy = RetryPolicy {
            attempts: 0,
            ..policy()
        };

        let outcome = execute(&transport, &request(), &policy).await;
        assert_eq!(outcome.result, Ok(json!(1)));
        assert_eq!(transport.calls(), 1);
    }
}
