use super::channel::{publish_json, MessageChannel, Topic};
use crate::StatusUpdate;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Sink notified of workflow and node transitions. Fire-and-forget.
pub trait StatusBroadcaster: Send + Sync {
    fn broadcast(&self, update: StatusUpdate);
}

/// In-process event bus for status updates
pub struct EventBus {
    sender: broadcast::Sender<StatusUpdate>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.sender.subscribe()
    }
}

impl StatusBroadcaster for EventBus {
    fn broadcast(&self, update: StatusUpdate) {
        let _ = self.sender.send(update);
    }
}

/// Publishes status updates on the status topic of a message channel.
///
/// Publishing happens on a spawned task, so this must be used from within a
/// tokio runtime. Failures are logged and dropped.
pub struct ChannelBroadcaster {
    channel: Arc<dyn MessageChannel>,
}

impl ChannelBroadcaster {
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self { channel }
    }
}

impl StatusBroadcaster for ChannelBroadcaster {
    fn broadcast(&self, update: StatusUpdate) {
        let channel = self.channel.clone();
        tokio::spawn(async move {
            let key = update.workflow_instance_id().to_string();
            if let Err(e) =
                publish_json(channel.as_ref(), Topic::StatusUpdates, &key, &update).await
            {
                tracing::warn!("Failed to publish status update for {}: {}", key, e);
            }
        });
    }
}

/// Forwards every update to each inner broadcaster.
pub struct FanoutBroadcaster {
    sinks: Vec<Arc<dyn StatusBroadcaster>>,
}

impl FanoutBroadcaster {
    pub fn new(sinks: Vec<Arc<dyn StatusBroadcaster>>) -> Self {
        Self { sinks }
    }
}

impl StatusBroadcaster for FanoutBroadcaster {
    fn broadcast(&self, update: StatusUpdate) {
        for sink in &self.sinks {
            sink.broadcast(update.clone());
        }
    }
}
