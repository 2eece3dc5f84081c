//! Per-metric periodic jobs
//!
//! A [`Job`] knows when its metric is next due and whether a firing of it is
//! currently in flight. The [`FiringSlot`] is the only piece of job state shared
//! with firing tasks: a task holds an [`InFlightGuard`] for as long as it runs
//! and the slot returns to `Idle` when the guard is dropped, even if the task
//! panicked.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::SchedulerError;
use crate::model::Metric;
use crate::time::{FREQUENCY_UNITS, TimeDetail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringState {
    Idle,
    Running,
}

#[derive(Debug, Default)]
pub struct FiringSlot {
    running: AtomicBool,
}

impl FiringSlot {
    pub fn state(&self) -> FiringState {
        if self.running.load(Ordering::Acquire) {
            FiringState::Running
        } else {
            FiringState::Idle
        }
    }

    /// Move the slot from `Idle` to `Running`, or return `None` if it is already running
    pub fn try_acquire(self: &Arc<Self>) -> Option<InFlightGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { slot: self.clone() })
    }
}

/// Marks a metric as being fired; releases the slot on drop
#[derive(Debug)]
pub struct InFlightGuard {
    slot: Arc<FiringSlot>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.slot.running.store(false, Ordering::Release);
    }
}

/// A firing that is allowed to start: the metric's slot is already held
#[derive(Debug)]
pub struct DueFiring {
    pub component_id: String,
    pub metric: Arc<Metric>,
    pub guard: InFlightGuard,
}

/// Point-in-time view of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub component_id: String,
    pub metric_id: String,
    pub frequency: TimeDetail,
    pub period: Duration,
    pub next_due: Instant,
    pub state: FiringState,
}

#[derive(Debug)]
pub struct Job {
    component_id: String,
    metric: Arc<Metric>,
    period: Duration,
    next_due: Instant,
    slot: Arc<FiringSlot>,
}

impl Job {
    /// Create the job for `metric`, first due one period after `scheduled_at`
    pub fn new(
        component_id: impl Into<String>,
        metric: Arc<Metric>,
        scheduled_at: Instant,
    ) -> Result<Self, SchedulerError> {
        let component_id = component_id.into();

        if !FREQUENCY_UNITS.contains(&metric.frequency.unit()) {
            return Err(SchedulerError::UnsupportedFrequency {
                component_id,
                metric_id: metric.id.clone(),
                frequency: metric.frequency,
            });
        }

        let period = metric.frequency.as_duration();

        Ok(Self {
            component_id,
            metric,
            period,
            next_due: scheduled_at + period,
            slot: Arc::new(FiringSlot::default()),
        })
    }

    /// Take over the firing slot of `previous`, the job this one replaces
    pub fn share_slot(&mut self, previous: &Job) {
        self.slot = previous.slot.clone();
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn state(&self) -> FiringState {
        self.slot.state()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Claim the slot for a firing outside the regular schedule
    pub fn begin(&self) -> Option<DueFiring> {
        self.slot.try_acquire().map(|guard| DueFiring {
            component_id: self.component_id.clone(),
            metric: self.metric.clone(),
            guard,
        })
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            component_id: self.component_id.clone(),
            metric_id: self.metric.id.clone(),
            frequency: self.metric.frequency,
            period: self.period,
            next_due: self.next_due,
            state: self.state(),
        }
    }
}

/// The scheduler's job table, one job per metric
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn push(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn find(&self, component_id: &str, metric_id: &str) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|job| job.component_id == component_id && job.metric.id == metric_id)
    }

    /// Collect a firing for every job due at `now`
    ///
    /// Each due job is rescheduled to `now + period`, whether it fires or not.
    /// A job whose previous firing is still running is skipped for this round
    /// rather than queued behind it.
    pub fn take_due(&mut self, now: Instant) -> Vec<DueFiring> {
        let mut due = Vec::new();

        for job in self.jobs.iter_mut().filter(|job| job.is_due(now)) {
            job.next_due = now + job.period;

            match job.begin() {
                Some(firing) => due.push(firing),
                None => debug!(
                    "skipping {}/{}: previous firing still running",
                    job.component_id, job.metric.id
                ),
            }
        }

        due
    }
}
