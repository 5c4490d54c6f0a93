use flowcore::{ExecutorMetadata, FlowError, TaskExecutor};
use std::collections::HashMap;
use std::sync::Arc;

/// Bundle of executors contributed by an extension.
pub trait ExecutorPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn executors(&self) -> Vec<Arc<dyn TaskExecutor>>;
}

/// Registry of available task executors, keyed by node type
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Register an executor, replacing any previous one of the same type
    pub fn register(&mut self, executor: Arc<dyn TaskExecutor>) {
        let node_type = executor.node_type().to_string();
        tracing::info!("Registering executor type: {}", node_type);
        self.executors.insert(node_type, executor);
    }

    /// Register a plugin's executors. Types that are already registered keep
    /// their existing executor.
    pub fn register_plugin(&mut self, plugin: &dyn ExecutorPlugin) {
        for executor in plugin.executors() {
            let node_type = executor.node_type().to_string();
            if self.executors.contains_key(&node_type) {
                tracing::debug!(
                    "Plugin {} skipped executor type {} (already registered)",
                    plugin.name(),
                    node_type
                );
                continue;
            }
            tracing::info!("Registering executor type {} from plugin {}", node_type, plugin.name());
            self.executors.insert(node_type, executor);
        }
    }

    pub fn resolve(&self, node_type: &str) -> Result<Arc<dyn TaskExecutor>, FlowError> {
        self.executors
            .get(node_type)
            .cloned()
            .ok_or_else(|| FlowError::UnsupportedType(node_type.to_string()))
    }

    /// Registered types, sorted
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn metadata(&self, node_type: &str) -> Option<ExecutorMetadata> {
        self.executors.get(node_type).map(|e| e.metadata())
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
