use async_trait::async_trait;
use flowcore::{ExecutionError, ExecutorMetadata, TaskEnvelope, TaskExecutor, TaskResult};

/// Notification executor. Delivery is simulated: the message is logged.
pub struct EmailExecutor;

#[async_trait]
impl TaskExecutor for EmailExecutor {
    fn node_type(&self) -> &str {
        "email"
    }

    async fn execute(&self, envelope: &TaskEnvelope) -> Result<TaskResult, ExecutionError> {
        let to = envelope.require_str("to")?;
        let subject = envelope.str_or("subject", "(no subject)");
        let content = envelope.str_or("content", envelope.input_or_empty());

        tracing::info!("Sending email to {}: {}", to, subject);
        tracing::debug!("Email body: {}", content);

        Ok(TaskResult::success(format!("email sent to {}", to))
            .with_detail("to", to)
            .with_detail("subject", subject))
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Send an email notification".to_string(),
            category: "notification".to_string(),
        }
    }
}
