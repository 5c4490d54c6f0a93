use crate::dispatcher::Dispatcher;
use crate::instantiator::Instantiator;
use crate::locks::InstanceLocks;
use crate::registry::ExecutorRegistry;
use crate::resolver::{Resolution, Resolver};
use crate::store::{MemoryStore, WorkflowStore};
use crate::worker::TaskWorker;
use flowcore::{
    ChannelBroadcaster, CompletionEvent, DefinitionId, EventBus, FanoutBroadcaster, FlowError,
    MemoryChannel, MessageChannel, NodeInstance, Result, StatusBroadcaster, StatusUpdate, Topic,
    WorkflowDefinition, WorkflowInstance, WorkflowInstanceId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TERMINAL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Main runtime: wires the store, channel and registry into the orchestrator
/// and worker roles.
pub struct FlowRuntime {
    config: RuntimeConfig,
    store: Arc<dyn WorkflowStore>,
    channel: Arc<dyn MessageChannel>,
    registry: Arc<ExecutorRegistry>,
    event_bus: Arc<EventBus>,
    resolver: Arc<Resolver>,
    instantiator: Instantiator,
    worker: Arc<TaskWorker>,
    cancel: CancellationToken,
}

impl FlowRuntime {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        channel: Arc<dyn MessageChannel>,
        registry: Arc<ExecutorRegistry>,
        config: RuntimeConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let broadcaster: Arc<dyn StatusBroadcaster> = Arc::new(FanoutBroadcaster::new(vec![
            event_bus.clone() as Arc<dyn StatusBroadcaster>,
            Arc::new(ChannelBroadcaster::new(channel.clone())),
        ]));

        let locks = Arc::new(InstanceLocks::new());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            channel.clone(),
            broadcaster.clone(),
        ));
        let resolver = Arc::new(Resolver::new(
            store.clone(),
            dispatcher.clone(),
            broadcaster.clone(),
            locks.clone(),
        ));
        let instantiator = Instantiator::new(
            store.clone(),
            dispatcher,
            resolver.clone(),
            broadcaster.clone(),
            locks,
        );
        let worker = Arc::new(TaskWorker::new(
            store.clone(),
            channel.clone(),
            registry.clone(),
            broadcaster,
        ));

        Self {
            config,
            store,
            channel,
            registry,
            event_bus,
            resolver,
            instantiator,
            worker,
            cancel: CancellationToken::new(),
        }
    }

    /// Runtime over an in-memory store and channel, for single-process runs
    pub fn in_memory(registry: ExecutorRegistry, config: RuntimeConfig) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryChannel::new()),
            Arc::new(registry),
            config,
        )
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn worker(&self) -> &Arc<TaskWorker> {
        &self.worker
    }

    /// Subscribe to status updates of every instance
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusUpdate> {
        self.event_bus.subscribe()
    }

    pub async fn save_definition(&self, definition: WorkflowDefinition) -> Result<DefinitionId> {
        let id = definition.id;
        tracing::info!("Saving workflow definition {} ({})", definition.name, id);
        self.store.save_definition(definition).await?;
        Ok(id)
    }

    pub async fn create_instance(
        &self,
        definition_id: DefinitionId,
        input: Option<String>,
    ) -> Result<WorkflowInstanceId> {
        self.instantiator.create_instance(definition_id, input).await
    }

    pub async fn terminate(&self, instance_id: WorkflowInstanceId) -> Result<WorkflowInstance> {
        self.resolver.terminate(instance_id).await
    }

    pub async fn on_node_completed(&self, event: &CompletionEvent) -> Result<Resolution> {
        self.resolver.on_node_completed(event).await
    }

    pub async fn instance(&self, instance_id: WorkflowInstanceId) -> Result<WorkflowInstance> {
        self.store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| FlowError::not_found("workflow instance", instance_id))
    }

    pub async fn nodes(&self, instance_id: WorkflowInstanceId) -> Result<Vec<NodeInstance>> {
        self.store.list_nodes(instance_id).await
    }

    /// Start consuming completion events in the orchestrator group
    pub async fn spawn_orchestrator(&self) -> Result<JoinHandle<()>> {
        let subscription = self
            .channel
            .subscribe(Topic::NodeCompleted, &self.config.orchestrator_group)
            .await?;
        let resolver = self.resolver.clone();
        let cancel = self.cancel.child_token();
        Ok(tokio::spawn(resolver.run(subscription, cancel)))
    }

    /// Start consuming task envelopes in the worker group
    pub async fn spawn_worker(&self) -> Result<JoinHandle<()>> {
        let subscription = self
            .channel
            .subscribe(Topic::Tasks, &self.config.worker_group)
            .await?;
        let semaphore = Arc::new(Semaphore::new(self.config.worker_concurrency.max(1)));
        let worker = self.worker.clone();
        let cancel = self.cancel.child_token();
        Ok(tokio::spawn(worker.run(subscription, semaphore, cancel)))
    }

    /// Run both roles in this process
    pub async fn start(&self) -> Result<Vec<JoinHandle<()>>> {
        Ok(vec![self.spawn_orchestrator().await?, self.spawn_worker().await?])
    }

    /// Stop every consumer loop started by this runtime
    pub fn shutdown(&self) {
        tracing::info!("Shutting down flow runtime");
        self.cancel.cancel();
    }

    /// Wait until the instance leaves RUNNING
    pub async fn wait_for_terminal(
        &self,
        instance_id: WorkflowInstanceId,
        timeout: Duration,
    ) -> Result<WorkflowInstance> {
        tokio::time::timeout(timeout, self.poll_terminal(instance_id))
            .await
            .map_err(|_| {
                FlowError::Timeout(format!(
                    "instance {} still running after {:?}",
                    instance_id, timeout
                ))
            })?
    }

    async fn poll_terminal(&self, instance_id: WorkflowInstanceId) -> Result<WorkflowInstance> {
        loop {
            let instance = self.instance(instance_id).await?;
            if instance.status.is_terminal() {
                return Ok(instance);
            }
            tokio::time::sleep(TERMINAL_POLL_INTERVAL).await;
        }
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum tasks a worker executes at once
    pub worker_concurrency: usize,
    pub event_buffer_size: usize,
    pub orchestrator_group: String,
    pub worker_group: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 10,
            event_buffer_size: 1000,
            orchestrator_group: "flow-orchestrator".to_string(),
            worker_group: "flow-workers".to_string(),
        }
    }
}
