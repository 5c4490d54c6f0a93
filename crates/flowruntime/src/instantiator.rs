use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::locks::InstanceLocks;
use crate::resolver::Resolver;
use crate::store::WorkflowStore;
use flowcore::{
    CompletionEvent, DefinitionId, FlowError, NodeInstance, Outcome, Result, StatusBroadcaster,
    StatusUpdate, WorkflowInstance, WorkflowInstanceId, WorkflowStatus,
};
use std::sync::Arc;

/// Turns a stored definition into a running instance and starts its entry
/// nodes.
pub struct Instantiator {
    store: Arc<dyn WorkflowStore>,
    dispatcher: Arc<Dispatcher>,
    resolver: Arc<Resolver>,
    broadcaster: Arc<dyn StatusBroadcaster>,
    locks: Arc<InstanceLocks>,
}

impl Instantiator {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        dispatcher: Arc<Dispatcher>,
        resolver: Arc<Resolver>,
        broadcaster: Arc<dyn StatusBroadcaster>,
        locks: Arc<InstanceLocks>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            resolver,
            broadcaster,
            locks,
        }
    }

    /// Create an instance of `definition_id` and dispatch its entry nodes.
    ///
    /// The instance and every node row are persisted in one store call before
    /// anything is sent. If an entry node cannot be dispatched the remaining
    /// entries are left PENDING and the failure is resolved like any other
    /// node failure, which fails the instance.
    pub async fn create_instance(
        &self,
        definition_id: DefinitionId,
        input: Option<String>,
    ) -> Result<WorkflowInstanceId> {
        let definition = self
            .store
            .get_definition(definition_id)
            .await?
            .ok_or_else(|| FlowError::not_found("workflow definition", definition_id))?;
        let config = definition.parse_config()?;

        let instance =
            WorkflowInstance::new(definition.id, input.clone()).with_edges(config.edges.clone());
        let instance_id = instance.id;
        let nodes: Vec<NodeInstance> = config
            .nodes
            .iter()
            .map(|node| NodeInstance::pending(instance_id, node, input.clone()))
            .collect();

        // Held until every entry node is out, so completions of early entries
        // wait for the rest of the first wave.
        let guard = self.locks.acquire(instance_id).await;

        self.store.create_instance(instance, nodes.clone()).await?;
        tracing::info!(
            "Created instance {} of workflow {} ({} nodes)",
            instance_id,
            definition.name,
            nodes.len()
        );
        self.broadcaster.broadcast(StatusUpdate::workflow(
            instance_id,
            WorkflowStatus::Running,
            "workflow started",
        ));

        let mut dispatch_failure = None;
        for entry in config.entry_nodes() {
            let Some(row) = nodes.iter().find(|n| n.node_id == entry.id) else {
                continue;
            };

            if let DispatchOutcome::Failed(message) = self
                .dispatcher
                .start_node(row, input.clone())
                .await?
            {
                dispatch_failure = Some(CompletionEvent {
                    workflow_instance_id: instance_id,
                    node_instance_id: row.id,
                    node_id: row.node_id.clone(),
                    status: Outcome::Failed,
                    output: None,
                    error_message: Some(message),
                });
                break;
            }
        }
        drop(guard);

        if let Some(event) = dispatch_failure {
            tracing::warn!(
                "Entry node {} of instance {} was not dispatched, failing the instance",
                event.node_id,
                instance_id
            );
            self.resolver.on_node_completed(&event).await?;
        }

        Ok(instance_id)
    }
}
