//! Entity model built from a validated configuration
//!
//! All entities are plain values. Once [`crate::config::read_config_file`] has
//! produced a [`MonitorConfig`] nothing in it changes for the lifetime of the
//! process, so the scheduler shares it behind an `Arc` without locking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::poller::PollOutcome;
use crate::time::TimeDetail;
use crate::util::urljoin;

/// Validated entity model: every system, component and metric to monitor
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// `meta.schemaVersion` of the file this model was built from
    pub version: String,
    pub systems: Vec<System>,
    pub components: Vec<Component>,
}

impl MonitorConfig {
    pub fn system(&self, id: &str) -> Option<&System> {
        self.systems.iter().find(|system| system.id == id)
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|component| component.id == id)
    }

    /// Total number of metrics across all components
    pub fn metric_count(&self) -> usize {
        self.components.iter().map(|c| c.metrics.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct System {
    pub id: String,
    pub name: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub id: String,
    pub name: String,
    /// Id of the [`System`] this component belongs to
    pub system_id: String,
    pub base_url: String,
    pub reference: String,
    pub auth_token: String,
    pub metrics: Vec<Metric>,
}

impl Component {
    pub fn metric(&self, id: &str) -> Option<&Metric> {
        self.metrics.iter().find(|metric| metric.id == id)
    }
}

/// A single monitored endpoint of a component
///
/// `auth_token` and `base_url` are always populated: when the config file
/// leaves them out they are copied from the owning component while the model
/// is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub id: String,
    pub endpoint: String,
    pub frequency: TimeDetail,
    pub expected_time: TimeDetail,
    pub timeout: TimeDetail,
    pub delete_after: TimeDetail,
    pub auth_token: String,
    pub base_url: String,
}

impl Metric {
    /// Full URL polled for this metric
    pub fn url(&self) -> String {
        urljoin(&self.base_url, &self.endpoint)
    }
}

/// Outcome of a single poll attempt, as persisted by the result store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricResult {
    pub metric_id: String,
    pub component_id: String,
    pub timestamp: DateTime<Utc>,

    /// `data` field of the endpoint's JSON body, absent when the poll failed
    pub value: Option<serde_json::Value>,

    /// `true` when the endpoint could not be reached (timeout or connection failure)
    pub timeout: bool,

    /// Milliseconds until the response arrived, `0` when the poll failed
    pub response_time: u64,

    pub status_code: Option<u16>,
}

impl MetricResult {
    /// Build the result of a poll that started at `timestamp`
    pub fn from_outcome(
        component_id: &str,
        metric_id: &str,
        timestamp: DateTime<Utc>,
        outcome: &PollOutcome,
    ) -> Self {
        let (value, timeout, response_time, status_code) = match outcome {
            PollOutcome::Success {
                status_code,
                elapsed_ms,
                body,
            } => (
                body.as_ref().and_then(|body| body.get("data")).cloned(),
                false,
                *elapsed_ms,
                Some(*status_code),
            ),
            PollOutcome::Timeout | PollOutcome::ConnectionFailure { .. } => (None, true, 0, None),
        };

        Self {
            metric_id: metric_id.to_string(),
            component_id: component_id.to_string(),
            timestamp,
            value,
            timeout,
            response_time,
            status_code,
        }
    }

    pub fn reachable(&self) -> bool {
        !self.timeout
    }
}
