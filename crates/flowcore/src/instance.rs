use crate::workflow::{sources_of, targets_of};
use crate::{DefinitionId, EdgeConfig, NodeConfig, NodeStatus, Value, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type WorkflowInstanceId = Uuid;
pub type NodeInstanceId = Uuid;

/// One run of a workflow definition.
///
/// `edges` is the definition's edge list as it was when the instance was
/// created; successors and predecessors are always read from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    pub id: WorkflowInstanceId,
    pub workflow_definition_id: DefinitionId,
    pub status: WorkflowStatus,
    pub input: Option<String>,
    pub output: Option<String>,
    pub error_message: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
}

impl WorkflowInstance {
    pub fn new(workflow_definition_id: DefinitionId, input: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_definition_id,
            status: WorkflowStatus::Running,
            input,
            output: None,
            error_message: None,
            start_time: Utc::now(),
            end_time: None,
            edges: Vec::new(),
        }
    }

    pub fn with_edges(mut self, edges: Vec<EdgeConfig>) -> Self {
        self.edges = edges;
        self
    }

    /// Distinct targets of edges leaving `node_id`, in edge order.
    pub fn successors(&self, node_id: &str) -> Vec<&str> {
        targets_of(&self.edges, node_id)
    }

    /// Distinct sources of edges entering `node_id`, in edge order.
    pub fn predecessors(&self, node_id: &str) -> Vec<&str> {
        sources_of(&self.edges, node_id)
    }
}

/// Execution record for one node of one workflow instance.
///
/// Node identity, type, name and config are copied from the definition when
/// the instance is created, so later edits to the definition never leak into a
/// running instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    pub id: NodeInstanceId,
    pub workflow_instance_id: WorkflowInstanceId,
    pub node_id: String,
    pub node_type: String,
    pub node_name: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    pub status: NodeStatus,
    pub input: Option<String>,
    pub output: Option<String>,
    pub error_message: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl NodeInstance {
    pub fn pending(
        workflow_instance_id: WorkflowInstanceId,
        node: &NodeConfig,
        input: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_instance_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            node_name: node.name.clone(),
            config: node.config.clone(),
            status: NodeStatus::Pending,
            input,
            output: None,
            error_message: None,
            start_time: None,
            end_time: None,
        }
    }

    /// Name used in user-facing messages, falling back to the node id.
    pub fn display_name(&self) -> &str {
        if self.node_name.is_empty() {
            &self.node_id
        } else {
            &self.node_name
        }
    }
}
