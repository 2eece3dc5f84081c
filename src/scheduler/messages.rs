//! Commands accepted by a running scheduler
//!
//! Sent through a [`SchedulerHandle`](super::SchedulerHandle); every command
//! that produces an answer carries a oneshot sender for it.

use tokio::sync::oneshot;

use super::SchedulerError;
use super::firing::FiringReport;
use super::job::JobStatus;
use crate::observer::Observer;

#[derive(Debug)]
pub enum SchedulerCommand {
    /// Fire one metric immediately, outside its schedule
    ///
    /// Rejected with `FiringInProgress` if the metric is already being fired.
    /// The metric's regular schedule is not shifted.
    FireNow {
        component_id: String,
        metric_id: String,
        respond_to: oneshot::Sender<Result<FiringReport, SchedulerError>>,
    },

    /// Add an observer; it is notified from the next firing on
    RegisterObserver { observer: Observer },

    /// Snapshot of the job table
    GetJobs {
        respond_to: oneshot::Sender<Vec<JobStatus>>,
    },

    /// Stop dispatching, wait for in-flight firings, then answer
    Shutdown { respond_to: oneshot::Sender<()> },
}
