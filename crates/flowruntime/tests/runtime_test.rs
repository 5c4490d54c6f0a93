// crates/flowruntime/tests/runtime_test.rs

mod common;

use common::{diamond, harness};
use flowcore::{NodeConfig, NodeStatus, WorkflowConfig, WorkflowStatus};
use std::time::Duration;

#[tokio::test]
async fn consumer_loops_drive_a_diamond_to_success() {
    let h = harness();
    let handles = h.runtime.start().await.unwrap();

    let instance = h.start(diamond(), "go").await;
    let finished = h
        .runtime
        .wait_for_terminal(instance, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(finished.status, WorkflowStatus::Success);
    for node in h.runtime.nodes(instance).await.unwrap() {
        assert_eq!(node.status, NodeStatus::Success, "node {}", node.node_id);
    }
    assert_eq!(h.dispatched_ids(instance).await.len(), 4);

    h.runtime.shutdown();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn consumer_loops_report_failures() {
    let h = harness();
    h.runtime.start().await.unwrap();

    let config = WorkflowConfig::new()
        .with_node(NodeConfig::new("a", "echo"))
        .with_node(NodeConfig::new("b", "fail"))
        .connect("a", "b");
    let instance = h.start(config, "").await;

    let finished = h
        .runtime
        .wait_for_terminal(instance, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(finished.status, WorkflowStatus::Failed);
    h.runtime.shutdown();
}

#[tokio::test]
async fn terminate_while_a_node_is_executing() {
    let h = harness();
    h.runtime.start().await.unwrap();

    let config = WorkflowConfig::new().with_node(NodeConfig::new("s", "slow"));
    let instance = h.start(config, "").await;

    // Let the worker pick the task up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.runtime.terminate(instance).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(h.node(instance, "s").await.status, NodeStatus::Terminated);
    assert!(h.completions(instance).await.is_empty());
    assert_eq!(
        h.runtime.instance(instance).await.unwrap().status,
        WorkflowStatus::Terminated
    );
    h.runtime.shutdown();
}

#[tokio::test]
async fn wait_for_terminal_times_out() {
    let h = harness();
    let instance = h.start(diamond(), "").await;

    let err = h
        .runtime
        .wait_for_terminal(instance, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, flowcore::FlowError::Timeout(_)));
}
