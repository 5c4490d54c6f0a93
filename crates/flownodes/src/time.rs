use async_trait::async_trait;
use flowcore::{ExecutionError, ExecutorMetadata, TaskEnvelope, TaskExecutor, TaskResult};
use tokio::time::{sleep, Duration};

/// Waits `delay_ms` (default one second), then passes its input through
pub struct DelayExecutor;

#[async_trait]
impl TaskExecutor for DelayExecutor {
    fn node_type(&self) -> &str {
        "delay"
    }

    async fn execute(&self, envelope: &TaskEnvelope) -> Result<TaskResult, ExecutionError> {
        let delay_ms = match envelope.node_config.get("delay_ms") {
            None => 1000.0,
            Some(value) => value.as_f64().filter(|ms| *ms >= 0.0).ok_or_else(|| {
                ExecutionError::InvalidConfig {
                    field: "delay_ms".to_string(),
                    expected: format!("non-negative number, got {}", value.type_name()),
                }
            })?,
        } as u64;

        tracing::info!("Delaying for {}ms", delay_ms);
        sleep(Duration::from_millis(delay_ms)).await;

        Ok(TaskResult::success(envelope.input_or_empty()).with_detail("delayMs", delay_ms as f64))
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
        }
    }
}
