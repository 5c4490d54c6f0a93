#![allow(dead_code)]

use async_trait::async_trait;
use flowcore::{
    CompletionEvent, DefinitionId, ExecutionError, MemoryChannel, NodeConfig, NodeInstance,
    TaskEnvelope, TaskExecutor, TaskResult, Topic, WorkflowConfig, WorkflowDefinition,
    WorkflowInstanceId,
};
use flowruntime::{ExecutorRegistry, FlowRuntime, MemoryStore, RuntimeConfig, WorkerOutcome};
use std::sync::Arc;
use std::time::Duration;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Appends its node id to the input it received.
pub struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    fn node_type(&self) -> &str {
        "echo"
    }

    async fn execute(&self, envelope: &TaskEnvelope) -> Result<TaskResult, ExecutionError> {
        Ok(TaskResult::success(format!(
            "{}|{}",
            envelope.input_or_empty(),
            envelope.node_id
        )))
    }
}

/// Always fails.
pub struct FailingExecutor;

#[async_trait]
impl TaskExecutor for FailingExecutor {
    fn node_type(&self) -> &str {
        "fail"
    }

    async fn execute(&self, _: &TaskEnvelope) -> Result<TaskResult, ExecutionError> {
        Err(ExecutionError::Failed("boom".to_string()))
    }
}

/// Sleeps long enough for a test to act while the node is RUNNING.
pub struct SlowExecutor;

#[async_trait]
impl TaskExecutor for SlowExecutor {
    fn node_type(&self) -> &str {
        "slow"
    }

    async fn execute(&self, envelope: &TaskEnvelope) -> Result<TaskResult, ExecutionError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(TaskResult::success(envelope.input_or_empty()))
    }
}

pub fn registry() -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(EchoExecutor));
    registry.register(Arc::new(FailingExecutor));
    registry.register(Arc::new(SlowExecutor));
    registry
}

pub fn echo(id: &str) -> NodeConfig {
    NodeConfig::new(id, "echo")
}

/// a -> {b, c} -> d
pub fn diamond() -> WorkflowConfig {
    WorkflowConfig::new()
        .with_node(echo("a"))
        .with_node(echo("b"))
        .with_node(echo("c"))
        .with_node(echo("d"))
        .connect("a", "b")
        .connect("a", "c")
        .connect("b", "d")
        .connect("c", "d")
}

pub struct Harness {
    pub runtime: FlowRuntime,
    pub store: Arc<MemoryStore>,
    pub channel: Arc<MemoryChannel>,
}

pub fn harness() -> Harness {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let channel = Arc::new(MemoryChannel::new());
    let runtime = FlowRuntime::new(
        store.clone(),
        channel.clone(),
        Arc::new(registry()),
        RuntimeConfig::default(),
    );
    Harness {
        runtime,
        store,
        channel,
    }
}

impl Harness {
    pub async fn define(&self, config: WorkflowConfig) -> DefinitionId {
        let definition = WorkflowDefinition::new("test", &config).unwrap();
        self.runtime.save_definition(definition).await.unwrap()
    }

    pub async fn start(&self, config: WorkflowConfig, input: &str) -> WorkflowInstanceId {
        let definition_id = self.define(config).await;
        self.runtime
            .create_instance(definition_id, Some(input.to_string()))
            .await
            .unwrap()
    }

    /// Task envelopes published for `instance`, in send order.
    pub async fn tasks(&self, instance: WorkflowInstanceId) -> Vec<TaskEnvelope> {
        self.channel
            .published_as::<TaskEnvelope>(Topic::Tasks)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.workflow_instance_id == instance)
            .collect()
    }

    pub async fn dispatched_ids(&self, instance: WorkflowInstanceId) -> Vec<String> {
        self.tasks(instance)
            .await
            .into_iter()
            .map(|t| t.node_id)
            .collect()
    }

    pub async fn completions(&self, instance: WorkflowInstanceId) -> Vec<CompletionEvent> {
        self.channel
            .published_as::<CompletionEvent>(Topic::NodeCompleted)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.workflow_instance_id == instance)
            .collect()
    }

    pub async fn task(&self, instance: WorkflowInstanceId, node_id: &str) -> TaskEnvelope {
        self.tasks(instance)
            .await
            .into_iter()
            .find(|t| t.node_id == node_id)
            .unwrap_or_else(|| panic!("no task dispatched for {}", node_id))
    }

    pub async fn node(&self, instance: WorkflowInstanceId, node_id: &str) -> NodeInstance {
        self.runtime
            .nodes(instance)
            .await
            .unwrap()
            .into_iter()
            .find(|n| n.node_id == node_id)
            .unwrap_or_else(|| panic!("no node instance for {}", node_id))
    }

    /// Run the worker for `node_id` and return the completion it published.
    pub async fn execute(&self, instance: WorkflowInstanceId, node_id: &str) -> CompletionEvent {
        let task = self.task(instance, node_id).await;
        let outcome = self.runtime.worker().handle(&task).await.unwrap();
        assert!(matches!(outcome, WorkerOutcome::Completed(_)), "{:?}", outcome);
        self.completions(instance)
            .await
            .into_iter()
            .rev()
            .find(|e| e.node_id == node_id)
            .unwrap()
    }
}
