use async_trait::async_trait;
use chrono::Utc;
use flowcore::{
    DefinitionId, FlowError, NodeInstance, NodeInstanceId, NodeStatus, Result,
    WorkflowDefinition, WorkflowInstance, WorkflowInstanceId, WorkflowStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Change applied to a node row by a guarded transition.
///
/// `start_time` is stamped when moving to `Running`, `end_time` when moving
/// to any terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpdate {
    pub status: NodeStatus,
    pub input: Option<String>,
    pub output: Option<String>,
    pub error_message: Option<String>,
}

impl NodeUpdate {
    pub fn running(input: Option<String>) -> Self {
        Self {
            status: NodeStatus::Running,
            input,
            output: None,
            error_message: None,
        }
    }

    pub fn finished(status: NodeStatus, output: Option<String>) -> Self {
        Self {
            status,
            input: None,
            output,
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Failed,
            input: None,
            output: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn terminated(error_message: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Terminated,
            input: None,
            output: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn with_error_message(mut self, error_message: impl Into<String>) -> Self {
        self.error_message = Some(error_message.into());
        self
    }

    fn apply(self, node: &mut NodeInstance) {
        let now = Utc::now();
        node.status = self.status;
        if self.status == NodeStatus::Running {
            node.start_time = Some(now);
        }
        if self.status.is_terminal() {
            node.end_time = Some(now);
        }
        if self.input.is_some() {
            node.input = self.input;
        }
        if self.output.is_some() {
            node.output = self.output;
        }
        if self.error_message.is_some() {
            node.error_message = self.error_message;
        }
    }
}

/// Change applied to a workflow instance row by a guarded transition.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceUpdate {
    pub status: WorkflowStatus,
    pub output: Option<String>,
    pub error_message: Option<String>,
}

impl InstanceUpdate {
    pub fn succeeded(output: Option<String>) -> Self {
        Self {
            status: WorkflowStatus::Success,
            output,
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: WorkflowStatus::Failed,
            output: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn terminated(error_message: impl Into<String>) -> Self {
        Self {
            status: WorkflowStatus::Terminated,
            output: None,
            error_message: Some(error_message.into()),
        }
    }

    fn apply(self, instance: &mut WorkflowInstance) {
        instance.status = self.status;
        if self.status.is_terminal() {
            instance.end_time = Some(Utc::now());
        }
        if self.output.is_some() {
            instance.output = self.output;
        }
        if self.error_message.is_some() {
            instance.error_message = self.error_message;
        }
    }
}

/// Persistence for definitions, instances and node rows.
///
/// Transitions are compare-and-set: the update is applied only when the row's
/// current status is one of `expected`, and `Ok(None)` reports a lost race.
/// Missing rows are `FlowError::NotFound`.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn save_definition(&self, definition: WorkflowDefinition) -> Result<()>;

    async fn get_definition(&self, id: DefinitionId) -> Result<Option<WorkflowDefinition>>;

    /// Persist an instance together with all of its node rows, or nothing.
    async fn create_instance(
        &self,
        instance: WorkflowInstance,
        nodes: Vec<NodeInstance>,
    ) -> Result<()>;

    async fn get_instance(&self, id: WorkflowInstanceId) -> Result<Option<WorkflowInstance>>;

    async fn get_node(&self, id: NodeInstanceId) -> Result<Option<NodeInstance>>;

    /// Node rows of an instance, in definition order.
    async fn list_nodes(&self, instance_id: WorkflowInstanceId) -> Result<Vec<NodeInstance>>;

    async fn transition_node(
        &self,
        id: NodeInstanceId,
        expected: &[NodeStatus],
        update: NodeUpdate,
    ) -> Result<Option<NodeInstance>>;

    async fn transition_instance(
        &self,
        id: WorkflowInstanceId,
        expected: &[WorkflowStatus],
        update: InstanceUpdate,
    ) -> Result<Option<WorkflowInstance>>;
}

#[derive(Default)]
struct Tables {
    definitions: HashMap<DefinitionId, WorkflowDefinition>,
    instances: HashMap<WorkflowInstanceId, WorkflowInstance>,
    nodes: HashMap<NodeInstanceId, NodeInstance>,
    nodes_by_instance: HashMap<WorkflowInstanceId, Vec<NodeInstanceId>>,
}

/// In-memory store. A single lock makes `create_instance` atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    create_failures: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `create_instance` fail.
    pub fn fail_next_creates(&self, count: usize) {
        self.create_failures.store(count, Ordering::SeqCst);
    }

    pub async fn instance_count(&self) -> usize {
        self.tables.read().await.instances.len()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn save_definition(&self, definition: WorkflowDefinition) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.definitions.insert(definition.id, definition);
        Ok(())
    }

    async fn get_definition(&self, id: DefinitionId) -> Result<Option<WorkflowDefinition>> {
        Ok(self.tables.read().await.definitions.get(&id).cloned())
    }

    async fn create_instance(
        &self,
        instance: WorkflowInstance,
        nodes: Vec<NodeInstance>,
    ) -> Result<()> {
        let injected = self
            .create_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(FlowError::Store("injected create failure".to_string()));
        }

        let mut tables = self.tables.write().await;
        if tables.instances.contains_key(&instance.id) {
            return Err(FlowError::Store(format!(
                "instance {} already exists",
                instance.id
            )));
        }

        let ids = nodes.iter().map(|n| n.id).collect();
        tables.nodes_by_instance.insert(instance.id, ids);
        for node in nodes {
            tables.nodes.insert(node.id, node);
        }
        tables.instances.insert(instance.id, instance);
        Ok(())
    }

    async fn get_instance(&self, id: WorkflowInstanceId) -> Result<Option<WorkflowInstance>> {
        Ok(self.tables.read().await.instances.get(&id).cloned())
    }

    async fn get_node(&self, id: NodeInstanceId) -> Result<Option<NodeInstance>> {
        Ok(self.tables.read().await.nodes.get(&id).cloned())
    }

    async fn list_nodes(&self, instance_id: WorkflowInstanceId) -> Result<Vec<NodeInstance>> {
        let tables = self.tables.read().await;
        let ids = tables
            .nodes_by_instance
            .get(&instance_id)
            .ok_or_else(|| FlowError::not_found("workflow instance", instance_id))?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.nodes.get(id).cloned())
            .collect())
    }

    async fn transition_node(
        &self,
        id: NodeInstanceId,
        expected: &[NodeStatus],
        update: NodeUpdate,
    ) -> Result<Option<NodeInstance>> {
        let mut tables = self.tables.write().await;
        let node = tables
            .nodes
            .get_mut(&id)
            .ok_or_else(|| FlowError::not_found("node instance", id))?;

        if !expected.contains(&node.status) || !node.status.can_transition_to(update.status) {
            return Ok(None);
        }

        update.apply(node);
        Ok(Some(node.clone()))
    }

    async fn transition_instance(
        &self,
        id: WorkflowInstanceId,
        expected: &[WorkflowStatus],
        update: InstanceUpdate,
    ) -> Result<Option<WorkflowInstance>> {
        let mut tables = self.tables.write().await;
        let instance = tables
            .instances
            .get_mut(&id)
            .ok_or_else(|| FlowError::not_found("workflow instance", id))?;

        if !expected.contains(&instance.status)
            || !instance.status.can_transition_to(update.status)
        {
            return Ok(None);
        }

        update.apply(instance);
        Ok(Some(instance.clone()))
    }
}
