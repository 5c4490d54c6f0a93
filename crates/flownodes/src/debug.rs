use async_trait::async_trait;
use flowcore::{ExecutionError, ExecutorMetadata, TaskEnvelope, TaskExecutor, TaskResult};

/// Logs the task it receives and passes its input through
pub struct DebugExecutor;

#[async_trait]
impl TaskExecutor for DebugExecutor {
    fn node_type(&self) -> &str {
        "debug"
    }

    async fn execute(&self, envelope: &TaskEnvelope) -> Result<TaskResult, ExecutionError> {
        let message = envelope.str_or("message", "(no message)");

        tracing::info!("DEBUG [{}]: {}", envelope.node_id, message);
        for (key, value) in &envelope.node_config {
            tracing::info!("  {}: {:?}", key, value);
        }
        tracing::info!("  input: {}", envelope.input_or_empty());

        Ok(TaskResult::success(envelope.input_or_empty()).with_detail("message", message))
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Logs its task for debugging".to_string(),
            category: "debug".to_string(),
        }
    }
}
