//! Periodic HTTP metric polling
//!
//! A YAML file describes systems, their components and the metrics each
//! component exposes over HTTP. The [`scheduler::Scheduler`] polls every metric
//! at its own frequency, persists the outcome as a [`model::MetricResult`] in a
//! [`storage::ResultStore`], prunes results older than the metric's retention
//! and notifies every registered [`observer::Observer`].

pub mod config;
pub mod model;
pub mod observer;
pub mod poller;
pub mod scheduler;
pub mod storage;
pub mod time;
pub mod util;
