//! End-to-end tests: poll → persist → prune → notify

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use openmonitor::model::MetricResult;
use openmonitor::observer::Observer;
use openmonitor::scheduler::{FiringState, Scheduler, SchedulerHandle};
use openmonitor::storage::{MemoryStore, ResultStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{bearer_token, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn mount_cpu_endpoint(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/cpu"))
        .and(bearer_token(TEST_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "usage": 12.5 } })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fire_now_persists_and_notifies_every_observer() {
    let component = MockServer::start().await;
    mount_cpu_endpoint(&component).await;

    let first = MockServer::start().await;
    let second = MockServer::start().await;
    for observer in [&first, &second] {
        Mock::given(method("POST"))
            .and(path("/notify"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(observer)
            .await;
    }

    let store = Arc::new(MemoryStore::new());
    let mut scheduler =
        Scheduler::new(create_test_model(&component.uri(), &[CPU]), store.clone()).unwrap();
    scheduler
        .register_observer(Observer::new("first", format!("{}/notify", first.uri())))
        .await;
    scheduler
        .register_observer(Observer::new("second", format!("{}/notify", second.uri())))
        .await;
    scheduler.schedule_events().unwrap();

    let handle = SchedulerHandle::spawn(scheduler);
    let report = handle.fire_now("api", "cpu").await.unwrap();

    assert!(report.persisted);
    assert_eq!(report.notifications.attempted, 2);
    assert_eq!(report.notifications.failed, 0);
    assert_eq!(report.result.value, Some(json!({ "usage": 12.5 })));
    assert_eq!(report.result.status_code, Some(200));
    assert!(!report.result.timeout);

    let stored = store.query_latest("api", "cpu", 10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], report.result);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dispatch_loop_fires_on_schedule() {
    let component = MockServer::start().await;
    mount_cpu_endpoint(&component).await;

    let store = Arc::new(MemoryStore::new());
    let mut scheduler =
        Scheduler::new(create_test_model(&component.uri(), &[CPU]), store.clone())
            .unwrap()
            .with_resolution(Duration::from_millis(100));
    scheduler.schedule_events().unwrap();

    let handle = SchedulerHandle::spawn(scheduler);

    // first firing is due one period (1s) after scheduling
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(store.is_empty().await, "nothing should fire before one period");

    tokio::time::sleep(Duration::from_millis(2200)).await;
    handle.shutdown().await.unwrap();

    let fired = store.query_latest("api", "cpu", 100).await.unwrap().len();
    assert!((1..=3).contains(&fired), "expected 1..=3 firings, got {fired}");
}

#[tokio::test]
async fn test_firing_prunes_results_outside_retention() {
    let component = MockServer::start().await;
    mount_cpu_endpoint(&component).await;

    let store = Arc::new(MemoryStore::new());
    let stale = MetricResult {
        metric_id: "cpu".to_string(),
        component_id: "api".to_string(),
        timestamp: Utc::now() - chrono::Duration::minutes(5),
        value: Some(json!(1)),
        timeout: false,
        response_time: 3,
        status_code: Some(200),
    };
    let recent = MetricResult {
        timestamp: Utc::now() - chrono::Duration::seconds(10),
        ..stale.clone()
    };
    store.insert(&stale).await.unwrap();
    store.insert(&recent).await.unwrap();

    let mut scheduler =
        Scheduler::new(create_test_model(&component.uri(), &[CPU]), store.clone()).unwrap();
    scheduler.schedule_events().unwrap();

    let report = scheduler.fire_metric("api", "cpu").await.unwrap();
    assert_eq!(report.pruned, Some(1));

    let stored = store.query_latest("api", "cpu", 10).await.unwrap();
    assert_eq!(stored, vec![recent, report.result]);
}

#[tokio::test]
async fn test_observer_registered_through_handle_is_notified() {
    let component = MockServer::start().await;
    mount_cpu_endpoint(&component).await;

    let observer = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/late"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&observer)
        .await;

    let store = Arc::new(MemoryStore::new());
    let mut scheduler =
        Scheduler::new(create_test_model(&component.uri(), &[CPU]), store).unwrap();
    scheduler.schedule_events().unwrap();

    let handle = SchedulerHandle::spawn(scheduler);

    let report = handle.fire_now("api", "cpu").await.unwrap();
    assert_eq!(report.notifications.attempted, 0);

    handle
        .register_observer(Observer::new("late", format!("{}/late", observer.uri())))
        .await
        .unwrap();

    let report = handle.fire_now("api", "cpu").await.unwrap();
    assert_eq!(report.notifications.attempted, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_jobs_lists_every_metric() {
    let store = Arc::new(MemoryStore::new());
    let model = create_test_model(
        &unreachable_url(),
        &[
            CPU,
            TestMetric {
                name: "memory",
                frequency: "2h",
                timeout: "1s",
            },
        ],
    );
    let mut scheduler = Scheduler::new(model, store).unwrap();
    scheduler.schedule_events().unwrap();

    let handle = SchedulerHandle::spawn(scheduler);
    let jobs = handle.jobs().await.unwrap();

    let ids: Vec<&str> = jobs.iter().map(|job| job.metric_id.as_str()).collect();
    assert_eq!(ids, vec!["cpu", "memory"]);
    assert!(jobs.iter().all(|job| job.state == FiringState::Idle));
    assert_eq!(jobs[1].frequency.to_string(), "2h");
    assert_eq!(jobs[1].period, Duration::from_secs(2 * 60 * 60));

    handle.shutdown().await.unwrap();
}
