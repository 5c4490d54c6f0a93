use crate::{ExecutionError, Outcome, TaskEnvelope, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capability that runs one kind of task.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Type tag matched against `NodeConfig::node_type` (e.g. "http", "email").
    fn node_type(&self) -> &str;

    /// Run the task described by `envelope`.
    async fn execute(&self, envelope: &TaskEnvelope) -> Result<TaskResult, ExecutionError>;

    /// Optional: describe the executor for listings.
    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata::default()
    }
}

/// Structured result of an executor run.
///
/// Serialized as a flat JSON object (`status`, `output`, then any details),
/// which is what gets persisted as the node's output and handed to
/// downstream nodes as their input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: Outcome,
    pub output: Value,
    #[serde(flatten)]
    pub details: HashMap<String, Value>,
}

impl TaskResult {
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            status: Outcome::Success,
            output: output.into(),
            details: HashMap::new(),
        }
    }

    pub fn failed(output: impl Into<Value>) -> Self {
        Self {
            status: Outcome::Failed,
            output: output.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Metadata about an executor type
#[derive(Debug, Clone)]
pub struct ExecutorMetadata {
    pub description: String,
    pub category: String,
}

impl Default for ExecutorMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_serializes_flat() {
        let result = TaskResult::success("done").with_detail("statusCode", 200u16);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            json!({ "status": "SUCCESS", "output": "done", "statusCode": 200.0 })
        );

        let back: TaskResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
