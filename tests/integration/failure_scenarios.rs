//! Failure tests for the firing pipeline
//!
//! These tests verify that a failing step never stops the rest of a firing:
//! - Unreachable or slow endpoints still produce a stored result
//! - HTTP errors count as reachable
//! - A broken store still lets observers be notified
//! - A broken observer does not affect the others

use std::sync::Arc;

use openmonitor::observer::Observer;
use openmonitor::scheduler::{Scheduler, SchedulerHandle};
use openmonitor::storage::{MemoryStore, ResultStore};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn scheduler_for(base_url: &str, store: Arc<dyn ResultStore>) -> Scheduler {
    let mut scheduler = Scheduler::new(create_test_model(base_url, &[CPU]), store).unwrap();
    scheduler.schedule_events().unwrap();
    scheduler
}

#[tokio::test]
async fn test_unreachable_endpoint_stores_timeout_result() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler_for(&unreachable_url(), store.clone());

    let report = scheduler.fire_metric("api", "cpu").await.unwrap();

    assert!(report.persisted);
    assert!(report.result.timeout);
    assert!(!report.result.reachable());
    assert_eq!(report.result.response_time, 0);
    assert_eq!(report.result.value, None);
    assert_eq!(report.result.status_code, None);
    assert_eq!(store.query_latest("api", "cpu", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let component = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cpu"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "data": 1 }))
                .set_delay(std::time::Duration::from_millis(800)),
        )
        .mount(&component)
        .await;

    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler_for(&component.uri(), store.clone());

    let report = scheduler.fire_metric("api", "cpu").await.unwrap();

    assert!(report.result.timeout);
    assert_eq!(report.result.response_time, 0);
    assert_eq!(report.result.value, None);
}

#[tokio::test]
async fn test_server_error_is_reachable() {
    let component = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cpu"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&component)
        .await;

    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler_for(&component.uri(), store.clone());

    let report = scheduler.fire_metric("api", "cpu").await.unwrap();

    assert!(report.result.reachable());
    assert_eq!(report.result.status_code, Some(500));
    assert_eq!(report.result.value, None);
}

#[tokio::test]
async fn test_malformed_body_keeps_result_reachable() {
    let component = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cpu"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{invalid json"))
        .mount(&component)
        .await;

    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler_for(&component.uri(), store);

    let report = scheduler.fire_metric("api", "cpu").await.unwrap();

    assert!(report.result.reachable());
    assert_eq!(report.result.status_code, Some(200));
    assert_eq!(report.result.value, None);
}

#[tokio::test]
async fn test_failing_store_still_notifies_observers() {
    let component = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cpu"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&component)
        .await;

    let observer = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&observer)
        .await;

    let scheduler = scheduler_for(&component.uri(), Arc::new(FailingStore));
    scheduler
        .register_observer(Observer::new("watcher", format!("{}/notify", observer.uri())))
        .await;

    let report = scheduler.fire_metric("api", "cpu").await.unwrap();

    assert!(!report.persisted);
    assert_eq!(report.pruned, None);
    assert_eq!(report.notifications.attempted, 1);
    assert_eq!(report.notifications.failed, 0);
}

#[tokio::test]
async fn test_unreachable_observer_does_not_block_others() {
    let component = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cpu"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&component)
        .await;

    let observer = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&observer)
        .await;

    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler_for(&component.uri(), store.clone());
    scheduler
        .register_observer(Observer::new("gone", format!("{}/notify", unreachable_url())))
        .await;
    scheduler
        .register_observer(Observer::new("alive", format!("{}/notify", observer.uri())))
        .await;

    let report = scheduler.fire_metric("api", "cpu").await.unwrap();

    assert!(report.persisted);
    assert_eq!(report.notifications.attempted, 2);
    assert_eq!(report.notifications.failed, 1);
}

#[tokio::test]
async fn test_fire_now_unknown_metric_is_an_error() {
    let store = Arc::new(MemoryStore::new());
    let handle = SchedulerHandle::spawn(scheduler_for(&unreachable_url(), store));

    let result = handle.fire_now("api", "disk").await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("disk"));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handle_errors_after_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let handle = SchedulerHandle::spawn(scheduler_for(&unreachable_url(), store));
    let clone = handle.clone();

    drop(handle);
    assert!(clone.jobs().await.is_ok());

    clone.shutdown().await.unwrap();
    assert!(clone.jobs().await.is_err());
}
