// tests/integration/failover_test.rs

use super::test_helpers::{TestContext, TestNode, init_tracing, new_clerk};
use cortado::client::{FailoverPolicy, ReplicaGroup};
use cortado::core::CortadoError;
use cortado::core::backend::{MemoryBackend, SharedBackend};
use cortado::core::protocol::Encoding;
use cortado::core::types::Statement;
use std::sync::Arc;

/// Two nodes with separate backends: a session opened on the first is unknown to the second.
async fn split_nodes() -> (TestNode, TestNode) {
    init_tracing();
    let a: SharedBackend = Arc::new(MemoryBackend::standalone());
    let b: SharedBackend = Arc::new(MemoryBackend::standalone());
    (TestNode::start(a).await, TestNode::start(b).await)
}

#[tokio::test]
async fn test_connect_only_surfaces_backend_errors_immediately() {
    let (a, b) = split_nodes().await;
    let clerk = new_clerk(Encoding::Binary, FailoverPolicy::ConnectOnly);
    let mut handle = clerk
        .open_connection(&ReplicaGroup::new([a.binary_addr.clone()]))
        .await
        .unwrap();

    let both = ReplicaGroup::new([a.binary_addr.clone(), b.binary_addr.clone()]);
    let err = clerk
        .execute_sql(&both, &mut handle, Statement::new("SELECT * FROM missing"))
        .await
        .unwrap_err();
    // Node b never saw the call, so the error is a's.
    assert!(matches!(err, CortadoError::Application(_)), "{err:?}");
}

#[tokio::test]
async fn test_any_error_policy_falls_through_to_the_last_node() {
    let (a, b) = split_nodes().await;
    let clerk = new_clerk(Encoding::Json, FailoverPolicy::AnyError);
    let mut handle = clerk
        .open_connection(&ReplicaGroup::new([a.json_addr.clone()]))
        .await
        .unwrap();

    let both = ReplicaGroup::new([a.json_addr.clone(), b.json_addr.clone()]);
    let err = clerk
        .execute_sql(&both, &mut handle, Statement::new("SELECT * FROM missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, CortadoError::UnknownSession(_)), "{err:?}");
}

#[tokio::test]
async fn test_stopped_node_is_skipped() {
    let mut ctx = TestContext::with_nodes(2).await;
    let clerk = ctx.clerk(Encoding::Binary);
    let group = ctx.group(&[0, 1], Encoding::Binary);

    let mut handle = clerk.open_connection(&group).await.unwrap();
    clerk
        .execute_sql(&group, &mut handle, Statement::new("CREATE TABLE t (a text)"))
        .await
        .unwrap();

    ctx.nodes[0].stop().await.unwrap();

    clerk
        .execute_sql(&group, &mut handle, Statement::new("INSERT INTO t VALUES ('after')"))
        .await
        .unwrap();
    let rows = clerk
        .execute_sql(&group, &mut handle, Statement::new("SELECT * FROM t"))
        .await
        .unwrap();
    assert_eq!(rows.tuples[0].cells, vec!["after"]);
}

#[tokio::test]
async fn test_empty_group_is_rejected_without_io() {
    let ctx = TestContext::with_nodes(1).await;
    let clerk = ctx.clerk(Encoding::Binary);
    let err = clerk
        .open_connection(&ReplicaGroup::new(Vec::<String>::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, CortadoError::EmptyGroup));
    assert_eq!(ctx.backend.open_sessions(), 0);
}
