//! Poller - performs one HTTP GET against a metric endpoint
//!
//! The outcome of a poll is classified into exactly three cases:
//!
//! - **Success**: a response arrived, whatever its status code. A `500` still
//!   means the endpoint was reachable; the status is recorded, not judged.
//! - **Timeout**: no complete response within the metric's timeout.
//! - **ConnectionFailure**: any other transport error (refused, DNS, TLS, ...).
//!
//! Failures never leave this module as errors, they are part of the outcome.

use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace, warn};

use crate::model::Metric;

/// Classified outcome of a single poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Success {
        status_code: u16,
        /// Milliseconds until the response headers arrived
        elapsed_ms: u64,
        /// Response body, when it is valid JSON
        body: Option<serde_json::Value>,
    },
    Timeout,
    ConnectionFailure {
        reason: String,
    },
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Success { .. })
    }
}

/// HTTP poller shared by every firing
///
/// Holds one `reqwest::Client` (and with it one connection pool) that is
/// reused across all metrics. Timeouts are applied per request.
#[derive(Debug, Clone)]
pub struct Poller {
    client: reqwest::Client,
}

impl Poller {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("openmonitor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Poll the endpoint of `metric` with the metric's own timeout and token
    pub async fn poll_metric(&self, metric: &Metric) -> PollOutcome {
        self.poll(
            &metric.url(),
            metric.timeout.as_duration(),
            Some(&metric.auth_token),
        )
        .await
    }

    /// Send a GET to `url`, bounded by `timeout` for the whole exchange
    ///
    /// The timeout covers connecting, waiting for headers and reading the
    /// body. A body that does not arrive in time makes the poll a timeout even
    /// if the headers were already received.
    #[instrument(skip(self, auth_token))]
    pub async fn poll(&self, url: &str, timeout: Duration, auth_token: Option<&str>) -> PollOutcome {
        trace!("polling {url}");

        let mut request = self.client.get(url).timeout(timeout);
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let start = Instant::now();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return classify_error(url, e),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        if status.is_success() {
            debug!("{url}: {status} in {elapsed_ms}ms");
        } else {
            warn!("{url}: returned {status}, still recording result");
        }

        let body = match response.bytes().await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(body) => Some(body),
                Err(e) => {
                    debug!("{url}: response body is not JSON: {e}");
                    None
                }
            },
            Err(e) => return classify_error(url, e),
        };

        PollOutcome::Success {
            status_code: status.as_u16(),
            elapsed_ms,
            body,
        }
    }
}

fn classify_error(url: &str, error: reqwest::Error) -> PollOutcome {
    if error.is_timeout() {
        warn!("{url}: request timed out");
        PollOutcome::Timeout
    } else {
        warn!("{url}: request failed: {error}");
        PollOutcome::ConnectionFailure {
            reason: error.to_string(),
        }
    }
}
