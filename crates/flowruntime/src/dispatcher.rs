use crate::store::{NodeUpdate, WorkflowStore};
use flowcore::{
    publish_json, ChannelError, MessageChannel, NodeInstance, NodeStatus, Result,
    StatusBroadcaster, StatusUpdate, TaskEnvelope, Topic,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Result of trying to start one node.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Persisted as RUNNING and acknowledged by the broker.
    Dispatched,
    /// The row was no longer PENDING; nothing was sent.
    Skipped(NodeStatus),
    /// The broker rejected the envelope; the node is now FAILED.
    Failed(String),
}

/// Sends task envelopes to workers.
pub struct Dispatcher {
    store: Arc<dyn WorkflowStore>,
    channel: Arc<dyn MessageChannel>,
    broadcaster: Arc<dyn StatusBroadcaster>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        channel: Arc<dyn MessageChannel>,
        broadcaster: Arc<dyn StatusBroadcaster>,
    ) -> Self {
        Self {
            store,
            channel,
            broadcaster,
        }
    }

    /// Envelope for `node`, carrying the config copied onto its row.
    pub fn envelope(node: &NodeInstance, input: Option<String>) -> TaskEnvelope {
        TaskEnvelope {
            workflow_instance_id: node.workflow_instance_id,
            node_instance_id: node.id,
            node_id: node.node_id.clone(),
            node_type: node.node_type.clone(),
            node_name: node.node_name.clone(),
            node_config: node.config.clone(),
            input,
            context: HashMap::new(),
        }
    }

    /// Publish on the tasks topic, keyed by workflow instance. Returns once the
    /// broker has acknowledged.
    pub async fn send(&self, envelope: &TaskEnvelope) -> std::result::Result<(), ChannelError> {
        let key = envelope.workflow_instance_id.to_string();
        publish_json(self.channel.as_ref(), Topic::Tasks, &key, envelope).await
    }

    /// Move a PENDING node to RUNNING, then send its envelope.
    ///
    /// The RUNNING row is written before the envelope leaves, so a worker never
    /// sees a task whose row is still PENDING. If the send fails the node is
    /// flipped to FAILED.
    pub async fn start_node(
        &self,
        node: &NodeInstance,
        input: Option<String>,
    ) -> Result<DispatchOutcome> {
        let running = match self
            .store
            .transition_node(
                node.id,
                &[NodeStatus::Pending],
                NodeUpdate::running(input.clone()),
            )
            .await?
        {
            Some(running) => running,
            None => {
                let current = self
                    .store
                    .get_node(node.id)
                    .await?
                    .map(|n| n.status)
                    .unwrap_or(node.status);
                tracing::debug!(
                    "Node {} is {}, not dispatching again",
                    node.node_id,
                    current
                );
                return Ok(DispatchOutcome::Skipped(current));
            }
        };

        self.broadcaster.broadcast(StatusUpdate::node(
            running.workflow_instance_id,
            running.id,
            running.node_id.as_str(),
            NodeStatus::Running,
            format!("node {} started", running.display_name()),
        ));

        let envelope = Self::envelope(&running, input);
        match self.send(&envelope).await {
            Ok(()) => {
                tracing::info!(
                    "Dispatched node {} ({}) of instance {}",
                    running.node_id,
                    running.node_type,
                    running.workflow_instance_id
                );
                Ok(DispatchOutcome::Dispatched)
            }
            Err(e) => {
                let message = format!("failed to send task to queue: {}", e);
                tracing::error!("Dispatch of node {} failed: {}", running.node_id, e);

                if self
                    .store
                    .transition_node(
                        running.id,
                        &[NodeStatus::Running],
                        NodeUpdate::failed(message.clone()),
                    )
                    .await?
                    .is_some()
                {
                    self.broadcaster.broadcast(StatusUpdate::node(
                        running.workflow_instance_id,
                        running.id,
                        running.node_id.as_str(),
                        NodeStatus::Failed,
                        message.clone(),
                    ));
                }
                Ok(DispatchOutcome::Failed(message))
            }
        }
    }
}
