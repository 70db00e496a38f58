//! HTTP readiness polling.
//!
//! A readiness timeout is a reportable outcome, not an error: a service that
//! never came up within budget is still a valid data point.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fastpull_common::error::{FastpullError, Result};
use thiserror::Error;
use tokio::time::Instant;

use crate::clock::RunClock;

/// Status code that counts as ready.
pub const READY_STATUS: u16 = 200;

/// A single failed probe attempt.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProbeError(pub String);

/// Issues a GET and reports the status code.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Requests `url` once.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError` when no response is received.
    async fn get_status(&self, url: &str) -> std::result::Result<u16, ProbeError>;
}

/// [`HttpProbe`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    /// Creates a probe whose requests time out after `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `FastpullError::Config` if the HTTP client cannot be built.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FastpullError::Config {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn get_status(&self, url: &str) -> std::result::Result<u16, ProbeError> {
        self.client
            .get(url)
            .send()
            .await
            .map(|response| response.status().as_u16())
            .map_err(|e| ProbeError(e.to_string()))
    }
}

/// Prefixes `http://` when the endpoint carries no scheme.
#[must_use]
pub fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// How a readiness poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessOutcome {
    /// The endpoint answered 200 at this run offset.
    Ready {
        /// Offset of the first successful response.
        at: Duration,
    },
    /// The budget elapsed without a successful response.
    TimedOut {
        /// Budget that elapsed.
        after: Duration,
    },
}

/// Result of a readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessResult {
    /// How the poll ended.
    pub outcome: ReadinessOutcome,
    /// Requests issued, including the successful one.
    pub attempts: u32,
}

impl ReadinessResult {
    /// Offset of the first success, if any.
    #[must_use]
    pub const fn ready_at(&self) -> Option<Duration> {
        match self.outcome {
            ReadinessOutcome::Ready { at } => Some(at),
            ReadinessOutcome::TimedOut { .. } => None,
        }
    }

    /// Whether the poll gave up.
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        matches!(self.outcome, ReadinessOutcome::TimedOut { .. })
    }
}

/// Polls an endpoint at a fixed interval until it answers or the budget runs out.
#[derive(Clone)]
pub struct ReadinessPoller {
    probe: Arc<dyn HttpProbe>,
    url: String,
    interval: Duration,
    timeout: Duration,
    request_timeout: Duration,
}

impl std::fmt::Debug for ReadinessPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessPoller")
            .field("url", &self.url)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ReadinessPoller {
    /// Creates a poller for `url`.
    #[must_use]
    pub fn new(
        probe: Arc<dyn HttpProbe>,
        url: impl Into<String>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            probe,
            url: url.into(),
            interval,
            timeout,
            request_timeout: interval.max(Duration::from_secs(1)),
        }
    }

    /// Bounds each individual request.
    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Endpoint being polled.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Polls until success or timeout.
    ///
    /// Failed attempts (connection refused, non-200, request timeout) are
    /// retried after the interval. Each request is cut off at the deadline,
    /// so the timeout outcome is returned no earlier than the budget and no
    /// later than one interval past it.
    pub async fn poll(&self, clock: &RunClock) -> ReadinessResult {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0_u32;
        tracing::info!(url = %self.url, interval_ms = self.interval.as_millis(), "polling for readiness");

        loop {
            attempts += 1;
            let budget = self
                .request_timeout
                .min(deadline.saturating_duration_since(Instant::now()));
            let response = tokio::time::timeout(budget, self.probe.get_status(&self.url)).await;
            match response {
                Ok(Ok(READY_STATUS)) => {
                    let at = clock.elapsed();
                    tracing::info!(
                        attempts,
                        elapsed = format_args!("{:.3}s", at.as_secs_f64()),
                        "endpoint ready"
                    );
                    return ReadinessResult {
                        outcome: ReadinessOutcome::Ready { at },
                        attempts,
                    };
                }
                Ok(Ok(status)) => tracing::debug!(attempts, status, "endpoint not ready"),
                Ok(Err(e)) => tracing::debug!(attempts, error = %e, "endpoint unreachable"),
                Err(_) => tracing::debug!(attempts, "readiness request timed out"),
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    attempts,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "readiness timed out"
                );
                return ReadinessResult {
                    outcome: ReadinessOutcome::TimedOut {
                        after: self.timeout,
                    },
                    attempts,
                };
            }
            tokio::time::sleep_until((now + self.interval).min(deadline)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Fails a fixed number of times, then answers 200.
    struct FlakyProbe {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl HttpProbe for FlakyProbe {
        async fn get_status(&self, _url: &str) -> std::result::Result<u16, ProbeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if call % 2 == 0 {
                    Err(ProbeError("connection refused".into()))
                } else {
                    Ok(503)
                }
            } else {
                Ok(200)
            }
        }
    }

    /// Never answers.
    struct HangingProbe;

    #[async_trait]
    impl HttpProbe for HangingProbe {
        async fn get_status(&self, _url: &str) -> std::result::Result<u16, ProbeError> {
            std::future::pending().await
        }
    }

    #[test]
    fn endpoints_without_scheme_get_http() {
        assert_eq!(normalize_endpoint("localhost:8080/health"), "http://localhost:8080/health");
        assert_eq!(normalize_endpoint("https://svc/ready"), "https://svc/ready");
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_n_failures_with_n_plus_one_attempts() {
        let clock = RunClock::start();
        let interval = Duration::from_secs(2);
        let poller = ReadinessPoller::new(
            Arc::new(FlakyProbe {
                failures: 3,
                calls: AtomicU32::new(0),
            }),
            "http://localhost:8080/health",
            interval,
            Duration::from_secs(60),
        );

        let result = poller.poll(&clock).await;
        assert_eq!(result.attempts, 4);
        let at = result.ready_at().expect("ready");
        assert!(at >= interval * 3, "success at {at:?} precedes the third retry delay");
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_one_interval_of_budget() {
        let clock = RunClock::start();
        let interval = Duration::from_secs(7);
        let timeout = Duration::from_secs(60);
        let poller = ReadinessPoller::new(
            Arc::new(FlakyProbe {
                failures: u32::MAX,
                calls: AtomicU32::new(0),
            }),
            "localhost:8080",
            interval,
            timeout,
        );

        let started = Instant::now();
        let result = poller.poll(&clock).await;
        let elapsed = started.elapsed();

        assert!(result.timed_out());
        assert!(result.ready_at().is_none());
        assert!(elapsed >= timeout);
        assert!(elapsed <= timeout + interval);
        assert!(result.attempts >= 9);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_requests_count_as_failed_attempts() {
        let clock = RunClock::start();
        let interval = Duration::from_secs(1);
        let timeout = Duration::from_secs(10);
        let poller = ReadinessPoller::new(Arc::new(HangingProbe), "localhost:8080", interval, timeout)
            .with_request_timeout(Duration::from_secs(5));

        let started = Instant::now();
        let result = poller.poll(&clock).await;
        let elapsed = started.elapsed();

        assert!(result.timed_out());
        assert_eq!(result.attempts, 2);
        assert!(elapsed >= timeout);
        assert!(elapsed <= timeout + interval, "gave up after {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn request_in_flight_at_deadline_is_cut_short() {
        let clock = RunClock::start();
        let interval = Duration::from_secs(1);
        let timeout = Duration::from_secs(60);
        let poller = ReadinessPoller::new(Arc::new(HangingProbe), "localhost:8080", interval, timeout)
            .with_request_timeout(Duration::from_secs(5));

        let started = Instant::now();
        let result = poller.poll(&clock).await;
        let elapsed = started.elapsed();

        assert!(result.timed_out());
        assert!(elapsed >= timeout);
        assert!(elapsed <= timeout + interval, "gave up after {elapsed:?}");
    }

    #[tokio::test]
    async fn reqwest_probe_reports_connection_errors() {
        let probe = ReqwestProbe::new(Duration::from_secs(1)).expect("client");
        // Port 9 (discard) is essentially never listening on a test host.
        let result = probe.get_status("http://127.0.0.1:9/health").await;
        assert!(result.is_err());
    }
}
