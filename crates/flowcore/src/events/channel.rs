use crate::ChannelError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Logical topics carried by the message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Task envelopes, orchestrator -> workers.
    Tasks,
    /// Completion events, workers -> orchestrator.
    NodeCompleted,
    /// Status broadcasts for external observers.
    StatusUpdates,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Tasks, Topic::NodeCompleted, Topic::StatusUpdates];

    pub fn name(self) -> &'static str {
        match self {
            Topic::Tasks => "flow-tasks",
            Topic::NodeCompleted => "flow-node-completed",
            Topic::StatusUpdates => "flow-status-updates",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A message received from a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Routing key the message was published with (the workflow instance
    /// id). Transports that do not retain the key report the partition.
    pub key: String,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// Durable, at-least-once transport between orchestrator and workers.
///
/// `publish` returns only once the broker has acknowledged the message.
/// Every consumer group sees each message; consumers sharing a group compete.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn publish(&self, topic: Topic, key: &str, payload: Vec<u8>)
        -> Result<(), ChannelError>;

    async fn subscribe(
        &self,
        topic: Topic,
        group: &str,
    ) -> Result<Box<dyn Subscription>, ChannelError>;
}

/// Receiving end of a topic for one consumer group.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message. `Ok(None)` means the channel was closed.
    async fn next(&mut self) -> Result<Option<Delivery>, ChannelError>;
}

/// Serialize `message` as JSON and publish it.
pub async fn publish_json<T: Serialize + Sync>(
    channel: &dyn MessageChannel,
    topic: Topic,
    key: &str,
    message: &T,
) -> Result<(), ChannelError> {
    let payload = serde_json::to_vec(message)
        .map_err(|e| ChannelError::PublishFailed(format!("serialization failed: {}", e)))?;
    channel.publish(topic, key, payload).await
}

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>;

#[derive(Default)]
struct TopicState {
    log: Vec<Delivery>,
    groups: HashMap<String, (mpsc::UnboundedSender<Delivery>, SharedReceiver)>,
    failures_remaining: usize,
}

/// In-process channel used by tests and single-process runs.
///
/// Keeps a log per topic so a consumer group created after messages were
/// published still receives them.
#[derive(Default)]
pub struct MemoryChannel {
    topics: Mutex<HashMap<Topic, TopicState>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` publishes to `topic` fail without recording them.
    pub async fn fail_next_publishes(&self, topic: Topic, count: usize) {
        let mut topics = self.topics.lock().await;
        topics.entry(topic).or_default().failures_remaining = count;
    }

    /// Every message successfully published to `topic`, in order.
    pub async fn published(&self, topic: Topic) -> Vec<Delivery> {
        let topics = self.topics.lock().await;
        topics
            .get(&topic)
            .map(|state| state.log.clone())
            .unwrap_or_default()
    }

    /// Decode every message published to `topic`.
    pub async fn published_as<T: DeserializeOwned>(
        &self,
        topic: Topic,
    ) -> Result<Vec<T>, serde_json::Error> {
        self.published(topic)
            .await
            .iter()
            .map(Delivery::decode)
            .collect()
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn publish(
        &self,
        topic: Topic,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<(), ChannelError> {
        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic).or_default();

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            tracing::warn!("Injected publish failure on topic {}", topic);
            return Err(ChannelError::PublishFailed(format!(
                "broker unavailable for topic {}",
                topic
            )));
        }

        let delivery = Delivery {
            key: key.to_string(),
            payload,
        };
        for (sender, _) in state.groups.values() {
            let _ = sender.send(delivery.clone());
        }
        state.log.push(delivery);

        Ok(())
    }

    async fn subscribe(
        &self,
        topic: Topic,
        group: &str,
    ) -> Result<Box<dyn Subscription>, ChannelError> {
        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic).or_default();

        let receiver = match state.groups.get(group) {
            Some((_, receiver)) => receiver.clone(),
            None => {
                let (sender, receiver) = mpsc::unbounded_channel();
                for delivery in &state.log {
                    let _ = sender.send(delivery.clone());
                }
                let receiver = Arc::new(Mutex::new(receiver));
                state
                    .groups
                    .insert(group.to_string(), (sender, receiver.clone()));
                receiver
            }
        };

        tracing::debug!("Subscribed group {} to topic {}", group, topic);
        Ok(Box::new(MemorySubscription { receiver }))
    }
}

struct MemorySubscription {
    receiver: SharedReceiver,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<Delivery>, ChannelError> {
        Ok(self.receiver.lock().await.recv().await)
    }
}
