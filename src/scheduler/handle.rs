use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};

use super::firing::FiringReport;
use super::job::JobStatus;
use super::messages::SchedulerCommand;
use super::Scheduler;
use crate::observer::Observer;

/// Handle for controlling a spawned [`Scheduler`]
///
/// Cloneable; the scheduler shuts down once every handle is dropped.
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn the dispatch loop of `scheduler` as a tokio task
    ///
    /// Call [`Scheduler::schedule_events`] first, otherwise nothing fires.
    pub fn spawn(scheduler: Scheduler) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        tokio::spawn(scheduler.run(Some(cmd_rx)));

        Self { sender: cmd_tx }
    }

    /// Fire a metric immediately and wait for its report
    pub async fn fire_now(&self, component_id: &str, metric_id: &str) -> Result<FiringReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::FireNow {
                component_id: component_id.to_string(),
                metric_id: metric_id.to_string(),
                respond_to: tx,
            })
            .await
            .context("failed to send FireNow command")?;

        let report = rx.await.context("failed to receive response")??;
        Ok(report)
    }

    pub async fn register_observer(&self, observer: Observer) -> Result<()> {
        self.sender
            .send(SchedulerCommand::RegisterObserver { observer })
            .await
            .context("failed to send RegisterObserver command")?;
        Ok(())
    }

    pub async fn jobs(&self) -> Result<Vec<JobStatus>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::GetJobs { respond_to: tx })
            .await
            .context("failed to send GetJobs command")?;

        rx.await.context("failed to receive response")
    }

    /// Stop the scheduler and wait until in-flight firings have finished
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("scheduler stopped without confirming shutdown")
    }
}
