//! Observers notified after every firing
//!
//! An observer is an external listener identified by a callback URL. After
//! each firing every registered observer receives a bare `POST` with an empty
//! body. Delivery is best-effort: a failing observer is logged and skipped,
//! nothing is retried and no acknowledgment is tracked.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::{Client, StatusCode};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Timeout applied to every callback request
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observer {
    pub name: String,
    pub callback_url: String,
}

impl Observer {
    pub fn new(name: impl Into<String>, callback_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            callback_url: callback_url.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to notify observer {observer}: {source}")]
pub struct ObserverDeliveryError {
    pub observer: String,
    #[source]
    pub source: reqwest::Error,
}

/// Shared, append-only list of observers
///
/// Cloning the registry yields another handle to the same list, so observers
/// registered through any clone are seen by every firing.
#[derive(Debug, Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<RwLock<Vec<Observer>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer. Registering the same observer twice notifies it twice.
    pub async fn register(&self, observer: Observer) {
        info!("registered observer {}", observer.name);
        self.observers.write().await.push(observer);
    }

    /// Copy of the current observer list
    pub async fn snapshot(&self) -> Vec<Observer> {
        self.observers.read().await.clone()
    }
}

/// Tally of one notification round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Number of observers a POST was attempted for
    pub attempted: usize,
    /// Attempts that failed at the transport level
    pub failed: usize,
}

/// Sends the callback requests
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
}

impl Notifier {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("openmonitor/", env!("CARGO_PKG_VERSION")))
            .timeout(DELIVERY_TIMEOUT)
            .build()?;

        Ok(Self { client })
    }

    /// Notify every observer in `registry` concurrently
    ///
    /// Never fails: each delivery error is logged and counted in the report.
    #[instrument(skip_all)]
    pub async fn notify_all(&self, registry: &ObserverRegistry) -> NotifyReport {
        let observers = registry.snapshot().await;
        if observers.is_empty() {
            return NotifyReport::default();
        }

        let deliveries = join_all(observers.iter().map(|observer| self.deliver(observer))).await;

        let failed = deliveries
            .into_iter()
            .filter_map(Result::err)
            .inspect(|e| warn!("{e}"))
            .count();

        NotifyReport {
            attempted: observers.len(),
            failed,
        }
    }

    /// POST an empty body to the observer's callback URL
    ///
    /// Any HTTP response counts as a delivered attempt; the status code is only
    /// logged.
    pub async fn deliver(&self, observer: &Observer) -> Result<StatusCode, ObserverDeliveryError> {
        debug!("calling observer {}", observer.name);

        let response = self
            .client
            .post(&observer.callback_url)
            .send()
            .await
            .map_err(|source| ObserverDeliveryError {
                observer: observer.name.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("observer {} answered {status}", observer.name);
        } else {
            warn!("observer {} answered {status}", observer.name);
        }

        Ok(status)
    }
}
