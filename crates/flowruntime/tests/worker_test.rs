// crates/flowruntime/tests/worker_test.rs

mod common;

use common::{echo, harness};
use flowcore::{NodeConfig, NodeStatus, Outcome, StatusUpdate, Topic, WorkflowConfig};
use flowruntime::WorkerOutcome;

#[tokio::test]
async fn worker_persists_result_before_publishing() {
    let h = harness();
    let instance = h
        .start(WorkflowConfig::new().with_node(echo("a")), "payload")
        .await;

    let event = h.execute(instance, "a").await;
    assert_eq!(event.status, Outcome::Success);

    let a = h.node(instance, "a").await;
    assert_eq!(a.status, NodeStatus::Success);
    assert!(a.end_time.is_some());
    assert_eq!(a.output, event.output);

    let output: serde_json::Value = serde_json::from_str(a.output.as_deref().unwrap()).unwrap();
    assert_eq!(output["status"], "SUCCESS");
    assert_eq!(output["output"], "payload|a");
}

#[tokio::test]
async fn redelivered_task_is_discarded() {
    let h = harness();
    let instance = h
        .start(WorkflowConfig::new().with_node(echo("a")), "")
        .await;

    h.execute(instance, "a").await;
    let task = h.task(instance, "a").await;
    let outcome = h.runtime.worker().handle(&task).await.unwrap();

    assert_eq!(outcome, WorkerOutcome::Discarded);
    assert_eq!(h.completions(instance).await.len(), 1);
}

#[tokio::test]
async fn pending_node_is_not_executed() {
    let h = harness();
    let config = WorkflowConfig::new()
        .with_node(echo("a"))
        .with_node(echo("b"))
        .connect("a", "b");
    let instance = h.start(config, "").await;

    // Forge an envelope for b while it is still PENDING.
    let mut task = h.task(instance, "a").await;
    let b = h.node(instance, "b").await;
    task.node_instance_id = b.id;
    task.node_id = b.node_id.clone();

    let outcome = h.runtime.worker().handle(&task).await.unwrap();
    assert_eq!(outcome, WorkerOutcome::Discarded);
    assert_eq!(h.node(instance, "b").await.status, NodeStatus::Pending);
}

#[tokio::test]
async fn unsupported_type_fails_the_node() {
    let h = harness();
    let instance = h
        .start(
            WorkflowConfig::new().with_node(NodeConfig::new("x", "carrier-pigeon")),
            "",
        )
        .await;

    let event = h.execute(instance, "x").await;
    assert_eq!(event.status, Outcome::Failed);
    assert!(event
        .error_message
        .as_deref()
        .unwrap()
        .contains("carrier-pigeon"));

    let x = h.node(instance, "x").await;
    assert_eq!(x.status, NodeStatus::Failed);
    assert_eq!(x.error_message, event.error_message);
}

#[tokio::test]
async fn executor_error_publishes_failed_completion() {
    let h = harness();
    let instance = h
        .start(WorkflowConfig::new().with_node(NodeConfig::new("x", "fail")), "")
        .await;

    let event = h.execute(instance, "x").await;
    assert_eq!(event.status, Outcome::Failed);
    assert_eq!(event.error_message.as_deref(), Some("boom"));
    assert!(event.output.is_none());

    let x = h.node(instance, "x").await;
    assert_eq!(x.status, NodeStatus::Failed);
    assert!(x.end_time.is_some());
}

#[tokio::test]
async fn node_transitions_are_broadcast() {
    let h = harness();
    let mut updates = h.runtime.subscribe_status();
    let instance = h
        .start(WorkflowConfig::new().with_node(echo("a")), "")
        .await;
    h.execute(instance, "a").await;

    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }

    assert!(matches!(
        seen.first(),
        Some(StatusUpdate::Workflow { status, .. }) if *status == flowcore::WorkflowStatus::Running
    ));
    let node_statuses: Vec<NodeStatus> = seen
        .iter()
        .filter_map(|u| match u {
            StatusUpdate::Node { status, .. } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(node_statuses, vec![NodeStatus::Running, NodeStatus::Success]);

    // The same updates go out on the status topic.
    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!h.channel.published(Topic::StatusUpdates).await.is_empty());
}

#[tokio::test]
async fn lost_completion_is_reported_as_failure() {
    let h = harness();
    let instance = h
        .start(WorkflowConfig::new().with_node(echo("a")), "")
        .await;
    let task = h.task(instance, "a").await;

    h.channel.fail_next_publishes(Topic::NodeCompleted, 1).await;
    let outcome = h.runtime.worker().handle(&task).await.unwrap();
    assert_eq!(outcome, WorkerOutcome::Completed(Outcome::Failed));

    let completions = h.completions(instance).await;
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].status, Outcome::Failed);
    assert!(completions[0]
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("failed to publish completion"));

    h.runtime.on_node_completed(&completions[0]).await.unwrap();
    let finished = h.runtime.instance(instance).await.unwrap();
    assert_eq!(finished.status, flowcore::WorkflowStatus::Failed);
}

#[tokio::test]
async fn completion_publish_gives_up_after_second_failure() {
    let h = harness();
    let instance = h
        .start(WorkflowConfig::new().with_node(echo("a")), "")
        .await;
    let task = h.task(instance, "a").await;

    h.channel.fail_next_publishes(Topic::NodeCompleted, 2).await;
    assert!(h.runtime.worker().handle(&task).await.is_err());

    assert!(h.completions(instance).await.is_empty());
    assert_eq!(h.node(instance, "a").await.status, NodeStatus::Success);
}
