//! One firing of a metric
//!
//! ```text
//! poll endpoint → build MetricResult → insert → prune by deleteAfter → notify observers
//! ```
//!
//! Every step runs even if an earlier one failed: a store error is logged and
//! the observers are still notified. Nothing here returns an error.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument};

use crate::model::{Metric, MetricResult};
use crate::observer::{Notifier, NotifyReport, ObserverRegistry};
use crate::poller::Poller;
use crate::storage::ResultStore;

/// What happened during one firing
#[derive(Debug, Clone, PartialEq)]
pub struct FiringReport {
    pub result: MetricResult,
    /// Whether the store accepted the result
    pub persisted: bool,
    /// Results deleted by retention pruning, `None` if pruning failed
    pub pruned: Option<usize>,
    pub notifications: NotifyReport,
}

/// Everything a firing task needs, cheap to clone into each task
#[derive(Clone)]
pub struct Firing {
    poller: Poller,
    store: Arc<dyn ResultStore>,
    observers: ObserverRegistry,
    notifier: Notifier,
}

impl Firing {
    pub fn new(
        poller: Poller,
        store: Arc<dyn ResultStore>,
        observers: ObserverRegistry,
        notifier: Notifier,
    ) -> Self {
        Self {
            poller,
            store,
            observers,
            notifier,
        }
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    #[instrument(skip_all, fields(component = %component_id, metric = %metric.id))]
    pub async fn run(&self, component_id: &str, metric: &Metric) -> FiringReport {
        info!("monitoring {}", metric.url());

        let timestamp = Utc::now();
        let outcome = self.poller.poll_metric(metric).await;
        let result = MetricResult::from_outcome(component_id, &metric.id, timestamp, &outcome);

        let persisted = match self.store.insert(&result).await {
            Ok(()) => true,
            Err(e) => {
                error!("failed to persist result: {e}");
                false
            }
        };

        let pruned = match self
            .store
            .delete_older_than(component_id, &metric.id, metric.delete_after)
            .await
        {
            Ok(deleted) => {
                if deleted > 0 {
                    debug!("pruned {deleted} results older than {}", metric.delete_after);
                }
                Some(deleted)
            }
            Err(e) => {
                error!("failed to prune results: {e}");
                None
            }
        };

        let notifications = self.notifier.notify_all(&self.observers).await;

        FiringReport {
            result,
            persisted,
            pruned,
            notifications,
        }
    }
}
