//! Concurrency tests
//!
//! These tests verify:
//! - A metric is never fired twice at the same time
//! - Slow metrics do not delay other metrics

use std::sync::Arc;
use std::time::Duration;

use openmonitor::scheduler::{FiringState, Scheduler, SchedulerHandle};
use openmonitor::storage::{MemoryStore, ResultStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

const SLOW: TestMetric = TestMetric {
    name: "slow",
    frequency: "1s",
    timeout: "5s",
};

async fn mount(server: &MockServer, endpoint: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_delay(delay))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_overlapping_firings_are_skipped() {
    let component = MockServer::start().await;
    mount(&component, "/slow", Duration::from_millis(2500)).await;

    let store = Arc::new(MemoryStore::new());
    let mut scheduler = Scheduler::new(create_test_model(&component.uri(), &[SLOW]), store)
        .unwrap()
        .with_resolution(Duration::from_millis(100));
    scheduler.schedule_events().unwrap();

    let handle = SchedulerHandle::spawn(scheduler);

    tokio::time::sleep(Duration::from_millis(1800)).await;
    let jobs = handle.jobs().await.unwrap();
    assert_eq!(jobs[0].state, FiringState::Running);

    // a manual firing is rejected while the scheduled one runs
    assert!(handle.fire_now("api", "slow").await.is_err());

    tokio::time::sleep(Duration::from_millis(1200)).await;
    handle.shutdown().await.unwrap();

    // due every second for ~3s, but each firing takes 2.5s
    let requests = component.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_slow_metric_does_not_delay_fast_metric() {
    let component = MockServer::start().await;
    mount(&component, "/slow", Duration::from_millis(2500)).await;
    mount(&component, "/cpu", Duration::ZERO).await;

    let store = Arc::new(MemoryStore::new());
    let mut scheduler =
        Scheduler::new(create_test_model(&component.uri(), &[SLOW, CPU]), store.clone())
            .unwrap()
            .with_resolution(Duration::from_millis(100));
    scheduler.schedule_events().unwrap();

    let handle = SchedulerHandle::spawn(scheduler);

    tokio::time::sleep(Duration::from_millis(2600)).await;

    let fast = store.query_latest("api", "cpu", 100).await.unwrap().len();
    let slow = store.query_latest("api", "slow", 100).await.unwrap().len();
    assert!(fast >= 2, "fast metric fired {fast} times");
    assert_eq!(slow, 0, "slow metric cannot have finished yet");

    handle.shutdown().await.unwrap();
    assert_eq!(store.query_latest("api", "slow", 100).await.unwrap().len(), 1);
}
