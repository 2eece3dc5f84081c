//! Scheduler - fires every metric of the monitoring model at its frequency
//!
//! ## Lifecycle
//!
//! 1. [`Scheduler::new`] takes the validated model and a result store
//! 2. [`Scheduler::schedule_events`] builds one [`Job`] per metric, each first
//!    due one period from now
//! 3. [`Scheduler::run_loop`] (or [`SchedulerHandle::spawn`]) checks the job
//!    table once per second and spawns a firing task for every due job
//!
//! ## Message Flow
//!
//! ```text
//! 1s tick → JobTable::take_due → spawn Firing::run per due metric
//!     ↑
//!     └─── Commands (FireNow, RegisterObserver, GetJobs, Shutdown)
//! ```
//!
//! Firings of different metrics run concurrently. A metric whose previous
//! firing has not finished when it comes due again is skipped for that round.

mod firing;
mod handle;
mod job;
mod messages;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

pub use firing::{Firing, FiringReport};
pub use handle::SchedulerHandle;
pub use job::{DueFiring, FiringSlot, FiringState, InFlightGuard, Job, JobStatus, JobTable};
pub use messages::SchedulerCommand;

use crate::model::MonitorConfig;
use crate::observer::{Notifier, Observer, ObserverRegistry};
use crate::poller::Poller;
use crate::storage::ResultStore;
use crate::time::TimeDetail;

/// How often the dispatch loop looks for due jobs
pub const DISPATCH_RESOLUTION: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(
        "frequency \"{frequency}\" of metric \"{metric_id}\" in component \"{component_id}\" is not supported, use s, m or h"
    )]
    UnsupportedFrequency {
        component_id: String,
        metric_id: String,
        frequency: TimeDetail,
    },

    #[error("no job for metric \"{metric_id}\" of component \"{component_id}\"")]
    UnknownMetric {
        component_id: String,
        metric_id: String,
    },

    #[error("metric \"{metric_id}\" of component \"{component_id}\" is already being fired")]
    FiringInProgress {
        component_id: String,
        metric_id: String,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub struct Scheduler {
    model: Arc<MonitorConfig>,
    firing: Firing,
    jobs: JobTable,
    tasks: JoinSet<()>,
    resolution: Duration,
}

impl Scheduler {
    /// Create a scheduler for `model` that persists into `store`
    ///
    /// Nothing is scheduled until [`schedule_events`](Self::schedule_events)
    /// is called.
    pub fn new(model: MonitorConfig, store: Arc<dyn ResultStore>) -> Result<Self, SchedulerError> {
        let firing = Firing::new(
            Poller::new()?,
            store,
            ObserverRegistry::new(),
            Notifier::new()?,
        );

        Ok(Self {
            model: Arc::new(model),
            firing,
            jobs: JobTable::default(),
            tasks: JoinSet::new(),
            resolution: DISPATCH_RESOLUTION,
        })
    }

    /// Check for due jobs every `resolution` instead of every second
    pub fn with_resolution(mut self, resolution: Duration) -> Self {
        self.resolution = resolution;
        self
    }

    pub async fn register_observer(&self, observer: Observer) {
        self.firing.observers().register(observer).await;
    }

    /// Build one job per metric of the model, replacing any previous table
    ///
    /// A metric that already had a job keeps its firing slot, so a firing
    /// still in flight from the old table blocks the new job too. Fails
    /// without scheduling anything if a metric's frequency unit is not
    /// seconds, minutes or hours. Returns the number of scheduled jobs.
    #[instrument(skip(self))]
    pub fn schedule_events(&mut self) -> Result<usize, SchedulerError> {
        let now = Instant::now();
        let mut jobs = JobTable::default();

        for component in &self.model.components {
            for metric in &component.metrics {
                let mut job = Job::new(component.id.clone(), Arc::new(metric.clone()), now)?;
                if let Some(previous) = self.jobs.find(&component.id, &metric.id) {
                    job.share_slot(previous);
                }
                debug!(
                    "scheduled {}/{} every {}",
                    component.id, metric.id, metric.frequency
                );
                jobs.push(job);
            }
        }

        info!("scheduled {} metrics", jobs.len());
        self.jobs = jobs;
        Ok(self.jobs.len())
    }

    pub fn jobs(&self) -> Vec<JobStatus> {
        self.jobs.iter().map(Job::status).collect()
    }

    /// Claim a metric for an immediate firing
    fn begin_firing(&self, component_id: &str, metric_id: &str) -> Result<DueFiring, SchedulerError> {
        let job = self
            .jobs
            .find(component_id, metric_id)
            .ok_or_else(|| SchedulerError::UnknownMetric {
                component_id: component_id.to_string(),
                metric_id: metric_id.to_string(),
            })?;

        job.begin().ok_or_else(|| SchedulerError::FiringInProgress {
            component_id: component_id.to_string(),
            metric_id: metric_id.to_string(),
        })
    }

    /// Fire one metric now and wait for the firing to finish
    ///
    /// Does not shift the metric's regular schedule.
    pub async fn fire_metric(
        &self,
        component_id: &str,
        metric_id: &str,
    ) -> Result<FiringReport, SchedulerError> {
        let DueFiring {
            component_id,
            metric,
            guard,
        } = self.begin_firing(component_id, metric_id)?;

        let report = self.firing.run(&component_id, &metric).await;
        drop(guard);
        Ok(report)
    }

    /// Spawn a firing task for every job due at `now`
    ///
    /// Must be called from within a Tokio runtime. Returns the number of
    /// firings started.
    pub fn run_pending(&mut self, now: Instant) -> usize {
        let due = self.jobs.take_due(now);
        let started = due.len();

        for DueFiring {
            component_id,
            metric,
            guard,
        } in due
        {
            let firing = self.firing.clone();
            self.tasks.spawn(async move {
                let _guard = guard;
                firing.run(&component_id, &metric).await;
            });
        }

        started
    }

    /// Run the dispatch loop forever
    pub async fn run_loop(self) {
        self.run(None).await;
    }

    /// Dispatch loop, optionally controlled through `commands`
    ///
    /// Runs until a `Shutdown` command arrives or the command channel closes.
    /// Without a channel it runs forever.
    #[instrument(skip_all)]
    pub(crate) async fn run(mut self, mut commands: Option<mpsc::Receiver<SchedulerCommand>>) {
        info!("starting dispatch loop with {} jobs", self.jobs.len());

        let mut ticker = interval(self.resolution);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shutdown_reply = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reap_finished();
                    self.run_pending(Instant::now());
                }

                command = next_command(&mut commands) => match command {
                    Some(SchedulerCommand::Shutdown { respond_to }) => {
                        debug!("received shutdown command");
                        shutdown_reply = Some(respond_to);
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        warn!("command channel closed, shutting down");
                        break;
                    }
                }
            }
        }

        self.drain().await;

        if let Some(respond_to) = shutdown_reply {
            let _ = respond_to.send(());
        }

        info!("dispatch loop stopped");
    }

    async fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::FireNow {
                component_id,
                metric_id,
                respond_to,
            } => {
                debug!("received FireNow for {component_id}/{metric_id}");

                match self.begin_firing(&component_id, &metric_id) {
                    Ok(DueFiring {
                        component_id,
                        metric,
                        guard,
                    }) => {
                        let firing = self.firing.clone();
                        self.tasks.spawn(async move {
                            let report = firing.run(&component_id, &metric).await;
                            drop(guard);
                            let _ = respond_to.send(Ok(report));
                        });
                    }
                    Err(e) => {
                        let _ = respond_to.send(Err(e));
                    }
                }
            }

            SchedulerCommand::RegisterObserver { observer } => {
                self.register_observer(observer).await;
            }

            SchedulerCommand::GetJobs { respond_to } => {
                let _ = respond_to.send(self.jobs());
            }

            // handled by the dispatch loop
            SchedulerCommand::Shutdown { .. } => {}
        }
    }

    fn reap_finished(&mut self) {
        while let Some(finished) = self.tasks.try_join_next() {
            if let Err(e) = finished {
                error!("firing task failed: {e}");
            }
        }
    }

    async fn drain(&mut self) {
        if !self.tasks.is_empty() {
            info!("waiting for {} in-flight firings", self.tasks.len());
        }

        while let Some(finished) = self.tasks.join_next().await {
            if let Err(e) = finished {
                error!("firing task failed: {e}");
            }
        }
    }
}

async fn next_command(
    commands: &mut Option<mpsc::Receiver<SchedulerCommand>>,
) -> Option<SchedulerCommand> {
    match commands {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
