//! Records exchanged over the message channel.

use crate::{
    ExecutionError, NodeInstanceId, NodeStatus, Outcome, Value, WorkflowInstanceId,
    WorkflowStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unit of work sent from the orchestrator to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnvelope {
    pub workflow_instance_id: WorkflowInstanceId,
    pub node_instance_id: NodeInstanceId,
    pub node_id: String,
    pub node_type: String,
    pub node_name: String,
    #[serde(default)]
    pub node_config: HashMap<String, Value>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

impl TaskEnvelope {
    /// Get a config value or fail with a configuration error.
    pub fn require_config(&self, key: &str) -> Result<&Value, ExecutionError> {
        self.node_config
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| ExecutionError::MissingConfig(key.to_string()))
    }

    /// Get a required string config value.
    pub fn require_str(&self, key: &str) -> Result<&str, ExecutionError> {
        let value = self.require_config(key)?;
        value.as_str().ok_or_else(|| ExecutionError::InvalidConfig {
            field: key.to_string(),
            expected: format!("string, got {}", value.type_name()),
        })
    }

    /// Get an optional string config value, falling back to `default`.
    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.node_config
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
    }

    pub fn input_or_empty(&self) -> &str {
        self.input.as_deref().unwrap_or("")
    }
}

/// Report of a node's terminal outcome, sent from a worker to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub workflow_instance_id: WorkflowInstanceId,
    pub node_instance_id: NodeInstanceId,
    pub node_id: String,
    pub status: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CompletionEvent {
    pub fn success(envelope: &TaskEnvelope, output: Option<String>) -> Self {
        Self {
            workflow_instance_id: envelope.workflow_instance_id,
            node_instance_id: envelope.node_instance_id,
            node_id: envelope.node_id.clone(),
            status: Outcome::Success,
            output,
            error_message: None,
        }
    }

    pub fn failure(envelope: &TaskEnvelope, error_message: impl Into<String>) -> Self {
        Self {
            workflow_instance_id: envelope.workflow_instance_id,
            node_instance_id: envelope.node_instance_id,
            node_id: envelope.node_id.clone(),
            status: Outcome::Failed,
            output: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn with_output(mut self, output: Option<String>) -> Self {
        self.output = output;
        self
    }
}

/// Status transition pushed to external observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum StatusUpdate {
    #[serde(rename_all = "camelCase")]
    Workflow {
        workflow_instance_id: WorkflowInstanceId,
        status: WorkflowStatus,
        message: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Node {
        workflow_instance_id: WorkflowInstanceId,
        node_instance_id: NodeInstanceId,
        node_id: String,
        status: NodeStatus,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl StatusUpdate {
    pub fn workflow(
        workflow_instance_id: WorkflowInstanceId,
        status: WorkflowStatus,
        message: impl Into<String>,
    ) -> Self {
        Self::Workflow {
            workflow_instance_id,
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn node(
        workflow_instance_id: WorkflowInstanceId,
        node_instance_id: NodeInstanceId,
        node_id: impl Into<String>,
        status: NodeStatus,
        message: impl Into<String>,
    ) -> Self {
        Self::Node {
            workflow_instance_id,
            node_instance_id,
            node_id: node_id.into(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn workflow_instance_id(&self) -> WorkflowInstanceId {
        match self {
            Self::Workflow {
                workflow_instance_id,
                ..
            }
            | Self::Node {
                workflow_instance_id,
                ..
            } => *workflow_instance_id,
        }
    }
}
