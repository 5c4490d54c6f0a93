// crates/flowcore/tests/channel_test.rs

use flowcore::events::{ChannelBroadcaster, EventBus, FanoutBroadcaster, StatusBroadcaster};
use flowcore::{
    publish_json, ChannelError, MemoryChannel, MessageChannel, StatusUpdate, Subscription, Topic,
    WorkflowStatus,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn every_group_sees_every_message() {
    let channel = MemoryChannel::new();
    let mut orchestrator = channel.subscribe(Topic::Tasks, "orchestrator").await.unwrap();
    let mut audit = channel.subscribe(Topic::Tasks, "audit").await.unwrap();

    channel.publish(Topic::Tasks, "k", b"one".to_vec()).await.unwrap();

    assert_eq!(orchestrator.next().await.unwrap().unwrap().payload, b"one");
    let delivery = audit.next().await.unwrap().unwrap();
    assert_eq!(delivery.payload, b"one");
    assert_eq!(delivery.key, "k");
}

#[tokio::test]
async fn consumers_in_one_group_compete() {
    let channel = MemoryChannel::new();
    let mut first = channel.subscribe(Topic::Tasks, "workers").await.unwrap();
    let mut second = channel.subscribe(Topic::Tasks, "workers").await.unwrap();

    channel.publish(Topic::Tasks, "k", b"1".to_vec()).await.unwrap();
    channel.publish(Topic::Tasks, "k", b"2".to_vec()).await.unwrap();

    let a = first.next().await.unwrap().unwrap();
    let b = second.next().await.unwrap().unwrap();
    assert_eq!(a.payload, b"1");
    assert_eq!(b.payload, b"2");

    let nothing = tokio::time::timeout(Duration::from_millis(20), first.next()).await;
    assert!(nothing.is_err(), "each message goes to one consumer of the group");
}

#[tokio::test]
async fn late_group_replays_backlog() {
    let channel = MemoryChannel::new();
    channel.publish(Topic::NodeCompleted, "k", b"early".to_vec()).await.unwrap();

    let mut late = channel.subscribe(Topic::NodeCompleted, "late").await.unwrap();
    assert_eq!(late.next().await.unwrap().unwrap().payload, b"early");
}

#[tokio::test]
async fn injected_failures_are_not_recorded() {
    let channel = MemoryChannel::new();
    channel.fail_next_publishes(Topic::Tasks, 1).await;

    let err = channel.publish(Topic::Tasks, "k", b"lost".to_vec()).await.unwrap_err();
    assert!(matches!(err, ChannelError::PublishFailed(_)));
    channel.publish(Topic::Tasks, "k", b"kept".to_vec()).await.unwrap();

    let published = channel.published(Topic::Tasks).await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload, b"kept");
}

#[tokio::test]
async fn broadcasters_fan_out_to_bus_and_channel() {
    let channel = Arc::new(MemoryChannel::new());
    let bus = Arc::new(EventBus::new(16));
    let mut receiver = bus.subscribe();

    let fanout = FanoutBroadcaster::new(vec![
        bus.clone() as Arc<dyn StatusBroadcaster>,
        Arc::new(ChannelBroadcaster::new(channel.clone())),
    ]);

    let instance = Uuid::new_v4();
    fanout.broadcast(StatusUpdate::workflow(
        instance,
        WorkflowStatus::Success,
        "workflow completed",
    ));

    let local = receiver.recv().await.unwrap();
    assert_eq!(local.workflow_instance_id(), instance);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let remote: Vec<StatusUpdate> = channel.published_as(Topic::StatusUpdates).await.unwrap();
    assert_eq!(remote, vec![local]);

    let published = channel.published(Topic::StatusUpdates).await;
    assert_eq!(published[0].key, instance.to_string());
}

#[tokio::test]
async fn publish_json_encodes_payload() {
    let channel = MemoryChannel::new();
    let update = StatusUpdate::workflow(Uuid::new_v4(), WorkflowStatus::Running, "progress");
    publish_json(&channel, Topic::StatusUpdates, "k", &update).await.unwrap();

    let decoded: Vec<StatusUpdate> = channel.published_as(Topic::StatusUpdates).await.unwrap();
    assert_eq!(decoded, vec![update]);
}
