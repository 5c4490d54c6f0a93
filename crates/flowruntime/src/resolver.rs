//! Completion handling: readiness of successors, the next dispatch wave and
//! the workflow's terminal status.

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::locks::InstanceLocks;
use crate::store::{InstanceUpdate, NodeUpdate, WorkflowStore};
use flowcore::{
    CompletionEvent, FlowError, NodeInstance, NodeStatus, Result, StatusBroadcaster,
    StatusUpdate, Subscription, WorkflowInstance, WorkflowInstanceId, WorkflowStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TERMINATED_MESSAGE: &str = "workflow terminated by request";
const POLL_RETRY_DELAY: Duration = Duration::from_millis(500);

/// What handling a completion event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Stale or duplicate event; nothing changed.
    Ignored,
    /// The workflow is still running. Lists node ids dispatched by this event.
    Running { dispatched: Vec<String> },
    /// The workflow reached this terminal status.
    Finished(WorkflowStatus),
}

pub struct Resolver {
    store: Arc<dyn WorkflowStore>,
    dispatcher: Arc<Dispatcher>,
    broadcaster: Arc<dyn StatusBroadcaster>,
    locks: Arc<InstanceLocks>,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        dispatcher: Arc<Dispatcher>,
        broadcaster: Arc<dyn StatusBroadcaster>,
        locks: Arc<InstanceLocks>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            broadcaster,
            locks,
        }
    }

    /// Handle one completion event under the instance lock.
    ///
    /// Safe to call more than once for the same event.
    pub async fn on_node_completed(&self, event: &CompletionEvent) -> Result<Resolution> {
        let _guard = self.locks.acquire(event.workflow_instance_id).await;
        self.resolve(event).await
    }

    async fn resolve(&self, event: &CompletionEvent) -> Result<Resolution> {
        let instance = self
            .store
            .get_instance(event.workflow_instance_id)
            .await?
            .ok_or_else(|| FlowError::not_found("workflow instance", event.workflow_instance_id))?;
        let completed = self
            .store
            .get_node(event.node_instance_id)
            .await?
            .ok_or_else(|| FlowError::not_found("node instance", event.node_instance_id))?;

        if instance.status.is_terminal() {
            tracing::debug!(
                "Ignoring completion of {} for finished instance {} ({})",
                completed.node_id,
                instance.id,
                instance.status
            );
            return Ok(Resolution::Ignored);
        }
        if completed.status == NodeStatus::Terminated {
            tracing::debug!("Ignoring completion of terminated node {}", completed.node_id);
            return Ok(Resolution::Ignored);
        }

        let completed_status = NodeStatus::from(event.status);
        tracing::info!(
            "Node {} of instance {} completed with {}",
            completed.node_id,
            instance.id,
            completed_status
        );

        if completed_status == NodeStatus::Failed {
            let message = match &event.error_message {
                Some(error) => format!("node {} failed: {}", completed.display_name(), error),
                None => format!("node {} failed", completed.display_name()),
            };
            return self.finish(instance.id, InstanceUpdate::failed(message)).await;
        }

        let rows = self.store.list_nodes(instance.id).await?;
        let by_node_id: HashMap<&str, &NodeInstance> =
            rows.iter().map(|n| (n.node_id.as_str(), n)).collect();
        // The event is authoritative for the node it reports on.
        let status_of = |node_id: &str| {
            if node_id == completed.node_id {
                Some(completed_status)
            } else {
                by_node_id.get(node_id).map(|n| n.status)
            }
        };

        // Edges come from the snapshot taken at creation, never the live
        // definition.
        let mut dispatched = Vec::new();
        for successor in instance.successors(&completed.node_id) {
            let ready = instance
                .predecessors(successor)
                .into_iter()
                .all(|p| status_of(p) == Some(NodeStatus::Success));
            if !ready {
                tracing::debug!("Node {} still waits on predecessors", successor);
                continue;
            }

            let Some(row) = by_node_id.get(successor) else {
                tracing::warn!("No node instance for {} in {}", successor, instance.id);
                continue;
            };
            if row.status != NodeStatus::Pending {
                tracing::debug!("Node {} is {}, skipping dispatch", successor, row.status);
                continue;
            }

            match self.dispatcher.start_node(row, event.output.clone()).await? {
                DispatchOutcome::Dispatched => dispatched.push(successor.to_string()),
                DispatchOutcome::Skipped(_) => {}
                DispatchOutcome::Failed(message) => {
                    tracing::warn!("Node {} could not be dispatched: {}", successor, message);
                }
            }
        }

        let rows = self.store.list_nodes(instance.id).await?;
        let statuses: Vec<(&NodeInstance, NodeStatus)> = rows
            .iter()
            .map(|n| {
                let status = if n.id == completed.id {
                    completed_status
                } else {
                    n.status
                };
                (n, status)
            })
            .collect();

        if let Some((failed, _)) = statuses.iter().find(|(_, s)| *s == NodeStatus::Failed) {
            let message = format!("node {} failed", failed.display_name());
            return self.finish(instance.id, InstanceUpdate::failed(message)).await;
        }

        let all_done = statuses
            .iter()
            .all(|(_, s)| matches!(s, NodeStatus::Success | NodeStatus::Failed));
        if all_done {
            return self
                .finish(instance.id, InstanceUpdate::succeeded(event.output.clone()))
                .await;
        }

        self.broadcaster.broadcast(StatusUpdate::workflow(
            instance.id,
            WorkflowStatus::Running,
            format!("node {} completed", completed.display_name()),
        ));
        Ok(Resolution::Running { dispatched })
    }

    async fn finish(
        &self,
        instance_id: WorkflowInstanceId,
        update: InstanceUpdate,
    ) -> Result<Resolution> {
        let status = update.status;
        let Some(finished) = self
            .store
            .transition_instance(instance_id, &[WorkflowStatus::Running], update)
            .await?
        else {
            return Ok(Resolution::Ignored);
        };

        let message = finished
            .error_message
            .clone()
            .unwrap_or_else(|| "workflow completed".to_string());
        tracing::info!("Workflow instance {} finished: {} ({})", instance_id, status, message);
        self.broadcaster
            .broadcast(StatusUpdate::workflow(instance_id, status, message));
        Ok(Resolution::Finished(status))
    }

    /// Force a running instance and its unfinished nodes to TERMINATED.
    ///
    /// Instances that already finished are returned unchanged. Workers still
    /// executing a terminated node lose their RUNNING guard and publish
    /// nothing.
    pub async fn terminate(&self, instance_id: WorkflowInstanceId) -> Result<WorkflowInstance> {
        let _guard = self.locks.acquire(instance_id).await;

        let instance = self
            .store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| FlowError::not_found("workflow instance", instance_id))?;
        if instance.status.is_terminal() {
            tracing::debug!("Instance {} already {}", instance_id, instance.status);
            return Ok(instance);
        }

        let Some(terminated) = self
            .store
            .transition_instance(
                instance_id,
                &[WorkflowStatus::Running],
                InstanceUpdate::terminated(TERMINATED_MESSAGE),
            )
            .await?
        else {
            return Ok(instance);
        };
        tracing::info!("Workflow instance {} terminated", instance_id);
        self.broadcaster.broadcast(StatusUpdate::workflow(
            instance_id,
            WorkflowStatus::Terminated,
            TERMINATED_MESSAGE,
        ));

        for node in self.store.list_nodes(instance_id).await? {
            if node.status.is_terminal() {
                continue;
            }
            if let Some(node) = self
                .store
                .transition_node(
                    node.id,
                    &[NodeStatus::Pending, NodeStatus::Running],
                    NodeUpdate::terminated(TERMINATED_MESSAGE),
                )
                .await?
            {
                self.broadcaster.broadcast(StatusUpdate::node(
                    instance_id,
                    node.id,
                    node.node_id.as_str(),
                    NodeStatus::Terminated,
                    TERMINATED_MESSAGE,
                ));
            }
        }

        Ok(terminated)
    }

    /// Consume completion events until cancelled. Each event is handled on its
    /// own task; the instance lock orders events of the same instance.
    pub async fn run(
        self: Arc<Self>,
        mut subscription: Box<dyn Subscription>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Starting completion consumer");

        loop {
            let next = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::info!("Shutdown requested, stopping completion consumer");
                    break;
                }

                next = subscription.next() => next,
            };

            let delivery = match next {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    tracing::info!("Completion subscription closed");
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to receive completion event: {}", e);
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            let event: CompletionEvent = match delivery.decode() {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!("Dropping malformed completion event: {}", e);
                    continue;
                }
            };

            let resolver = self.clone();
            tokio::spawn(async move {
                match resolver.on_node_completed(&event).await {
                    Ok(resolution) => {
                        tracing::debug!(
                            "Completion of {} in {} resolved: {:?}",
                            event.node_id,
                            event.workflow_instance_id,
                            resolution
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to handle completion of {} in {}: {}",
                            event.node_id,
                            event.workflow_instance_id,
                            e
                        );
                    }
                }
            });
        }
    }
}
