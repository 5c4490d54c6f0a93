use crate::registry::ExecutorRegistry;
use crate::store::{NodeUpdate, WorkflowStore};
use flowcore::{
    publish_json, CompletionEvent, FlowError, MessageChannel, NodeStatus, Outcome, Result,
    StatusBroadcaster, StatusUpdate, Subscription, TaskEnvelope, Topic,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

const POLL_RETRY_DELAY: Duration = Duration::from_millis(500);

/// What a worker did with one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The node was finished and a completion event published.
    Completed(Outcome),
    /// The node was not RUNNING (duplicate, stale or terminated); nothing done.
    Discarded,
}

/// Executes task envelopes and reports their outcome.
pub struct TaskWorker {
    store: Arc<dyn WorkflowStore>,
    channel: Arc<dyn MessageChannel>,
    registry: Arc<ExecutorRegistry>,
    broadcaster: Arc<dyn StatusBroadcaster>,
}

impl TaskWorker {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        channel: Arc<dyn MessageChannel>,
        registry: Arc<ExecutorRegistry>,
        broadcaster: Arc<dyn StatusBroadcaster>,
    ) -> Self {
        Self {
            store,
            channel,
            registry,
            broadcaster,
        }
    }

    pub async fn handle(&self, envelope: &TaskEnvelope) -> Result<WorkerOutcome> {
        let node = self
            .store
            .get_node(envelope.node_instance_id)
            .await?
            .ok_or_else(|| FlowError::not_found("node instance", envelope.node_instance_id))?;

        if node.status != NodeStatus::Running {
            tracing::debug!(
                "Discarding task for node {} in status {}",
                node.node_id,
                node.status
            );
            return Ok(WorkerOutcome::Discarded);
        }

        tracing::info!(
            "Executing node {} ({}) of instance {}",
            envelope.node_id,
            envelope.node_type,
            envelope.workflow_instance_id
        );

        let result = match self.registry.resolve(&envelope.node_type) {
            Ok(executor) => executor.execute(envelope).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let (update, event) = match result {
            Ok(result) => {
                let output = serde_json::to_string(&result)?;
                match result.status {
                    Outcome::Success => (
                        NodeUpdate::finished(NodeStatus::Success, Some(output.clone())),
                        CompletionEvent::success(envelope, Some(output)),
                    ),
                    Outcome::Failed => {
                        let message = format!("node {} reported failure", envelope.node_name);
                        (
                            NodeUpdate::finished(NodeStatus::Failed, Some(output.clone()))
                                .with_error_message(message.clone()),
                            CompletionEvent::failure(envelope, message)
                                .with_output(Some(output)),
                        )
                    }
                }
            }
            Err(message) => {
                tracing::warn!("Node {} failed: {}", envelope.node_id, message);
                (
                    NodeUpdate::failed(message.clone()),
                    CompletionEvent::failure(envelope, message),
                )
            }
        };

        let status = update.status;
        let Some(finished) = self
            .store
            .transition_node(node.id, &[NodeStatus::Running], update)
            .await?
        else {
            tracing::debug!(
                "Node {} left RUNNING while executing, dropping its result",
                node.node_id
            );
            return Ok(WorkerOutcome::Discarded);
        };

        self.broadcaster.broadcast(StatusUpdate::node(
            finished.workflow_instance_id,
            finished.id,
            finished.node_id.as_str(),
            status,
            format!("node {} {}", finished.display_name(), status),
        ));

        let key = envelope.workflow_instance_id.to_string();
        if let Err(e) = publish_json(self.channel.as_ref(), Topic::NodeCompleted, &key, &event).await
        {
            tracing::error!(
                "Failed to publish completion of node {}: {}",
                envelope.node_id,
                e
            );
            // One more attempt, reporting the node as failed so the
            // orchestrator can still finish the instance.
            let fallback = CompletionEvent::failure(
                envelope,
                format!("failed to publish completion: {}", e),
            );
            publish_json(self.channel.as_ref(), Topic::NodeCompleted, &key, &fallback).await?;
            return Ok(WorkerOutcome::Completed(Outcome::Failed));
        }

        Ok(WorkerOutcome::Completed(event.status))
    }

    /// Consume task envelopes until cancelled, running at most as many tasks
    /// at once as `semaphore` has permits.
    pub async fn run(
        self: Arc<Self>,
        mut subscription: Box<dyn Subscription>,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
    ) {
        tracing::info!(
            "Starting task worker ({} slots)",
            semaphore.available_permits()
        );

        loop {
            let next = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::info!("Shutdown requested, stopping task worker");
                    break;
                }

                next = subscription.next() => next,
            };

            let delivery = match next {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    tracing::info!("Task subscription closed");
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to receive task: {}", e);
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            let envelope: TaskEnvelope = match delivery.decode() {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::error!("Dropping malformed task envelope: {}", e);
                    continue;
                }
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("Semaphore closed, stopping task worker");
                    break;
                }
            };

            let worker = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match worker.handle(&envelope).await {
                    Ok(outcome) => {
                        tracing::debug!("Task {} handled: {:?}", envelope.node_id, outcome);
                    }
                    Err(e) => {
                        tracing::error!(
                            "Task {} of instance {} failed: {}",
                            envelope.node_id,
                            envelope.workflow_instance_id,
                            e
                        );
                    }
                }
            });
        }
    }
}
