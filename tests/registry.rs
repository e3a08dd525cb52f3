//! Registry Integration Tests
//!
//! Tests for connector lifecycle: idempotent removal, teardown guarantees
//! and TUT linkage.

use std::sync::Arc;

use cohort_harness::audit::NullAuditSink;
use cohort_harness::connectors::{InMemoryConnector, RepositoryConnector};
use cohort_harness::core::{ConnectorRegistry, RemoteRemoval};

fn registry() -> ConnectorRegistry {
    ConnectorRegistry::new("tutServer", Arc::new(NullAuditSink::new()))
}

fn connector(server: &str) -> Arc<dyn RepositoryConnector> {
    Arc::new(InMemoryConnector::new(server))
}

#[tokio::test]
async fn test_removal_is_idempotent() {
    let registry = registry();
    registry.add_remote("collA", Some(connector("other"))).await;

    let first = registry.remove_remote("collA").await;
    let second = registry.remove_remote("collA").await;

    assert_eq!(first, RemoteRemoval::Removed);
    assert_eq!(second, RemoteRemoval::NotFound);
    assert_eq!(registry.registered_count().await, 0);
}

#[tokio::test]
async fn test_disconnect_all_empties_state() {
    let registry = registry();
    registry.add_remote("collA", Some(connector("tutServer"))).await;
    registry.add_remote("collB", Some(connector("other"))).await;
    registry
        .register_local("collLocal", connector("localServer"))
        .await;

    let failures = registry.disconnect_all().await;

    assert!(failures.is_empty());
    assert_eq!(registry.registered_count().await, 0);
    assert!(!registry.is_tut_registered().await);
    assert!(registry.local_registration().await.is_none());
}

#[tokio::test]
async fn test_disconnect_all_survives_a_failing_connector() {
    let registry = registry();
    let healthy = Arc::new(InMemoryConnector::new("other"));
    let broken = Arc::new(InMemoryConnector::new("tutServer").fail_disconnect(true));

    registry
        .add_remote("collA", Some(Arc::clone(&broken) as Arc<dyn RepositoryConnector>))
        .await;
    registry
        .add_remote("collB", Some(Arc::clone(&healthy) as Arc<dyn RepositoryConnector>))
        .await;

    let failures = registry.disconnect_all().await;

    // The failure is reported, not raised, and teardown still completes
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].metadata_collection_id, "collA");
    assert_eq!(failures[0].server_name, "tutServer");
    assert!(healthy.is_disconnected());

    assert_eq!(registry.registered_count().await, 0);
    assert!(!registry.is_tut_registered().await);
}

#[tokio::test]
async fn test_tut_departure_clears_linkage() {
    let registry = registry();
    registry.add_remote("collA", Some(connector("tutServer"))).await;
    assert!(registry.is_tut_registered().await);

    let outcome = registry.remove_remote("collA").await;

    assert_eq!(outcome, RemoteRemoval::TutDeparted);
    assert!(!registry.is_tut_registered().await);
    assert!(registry.tut_identity().await.is_none());
}

#[tokio::test]
async fn test_non_tut_departure_keeps_linkage() {
    let registry = registry();
    registry.add_remote("collA", Some(connector("tutServer"))).await;
    registry.add_remote("collB", Some(connector("other"))).await;

    let outcome = registry.remove_remote("collB").await;

    assert_eq!(outcome, RemoteRemoval::Removed);
    assert!(registry.is_tut_registered().await);
}
