use crate::{FlowError, Value};
use chrono::{DateTime, Utc};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub type DefinitionId = Uuid;

/// Stored workflow definition.
///
/// `config` holds the payload exactly as it was saved; it is parsed into a
/// [`WorkflowConfig`] on demand so a malformed payload surfaces as
/// [`FlowError::InvalidConfig`] when an instance is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default = "Uuid::new_v4")]
    pub id: DefinitionId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default = "default_definition_status")]
    pub status: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_definition_status() -> String {
    "ACTIVE".to_string()
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, config: &WorkflowConfig) -> Result<Self, FlowError> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            config: serde_json::to_value(config)?,
            status: default_definition_status(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parse the stored config, rejecting payloads without nodes.
    pub fn parse_config(&self) -> Result<WorkflowConfig, FlowError> {
        if self.config.is_null() {
            return Err(FlowError::InvalidConfig("config is missing".to_string()));
        }

        let config: WorkflowConfig = serde_json::from_value(self.config.clone())
            .map_err(|e| FlowError::InvalidConfig(format!("malformed config: {}", e)))?;

        if config.nodes.is_empty() {
            return Err(FlowError::InvalidConfig("config has no nodes".to_string()));
        }

        let mut seen = HashSet::new();
        for node in &config.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(FlowError::InvalidConfig(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }

        Ok(config)
    }
}

/// Nodes and edges of a workflow graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
}

impl WorkflowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn connect(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        self.edges.push(EdgeConfig {
            id: format!("e-{}-{}", source, target),
            source,
            target,
        });
        self
    }

    /// Map from each edge target to the set of its sources.
    pub fn predecessor_map(&self) -> HashMap<&str, HashSet<&str>> {
        let mut map: HashMap<&str, HashSet<&str>> = HashMap::new();
        for edge in &self.edges {
            map.entry(edge.target.as_str())
                .or_default()
                .insert(edge.source.as_str());
        }
        map
    }

    /// Nodes with no incoming edge, in definition order.
    pub fn entry_nodes(&self) -> Vec<&NodeConfig> {
        let predecessors = self.predecessor_map();
        self.nodes
            .iter()
            .filter(|n| !predecessors.contains_key(n.id.as_str()))
            .collect()
    }

    /// Distinct targets of edges leaving `node_id`, in edge order.
    pub fn successors(&self, node_id: &str) -> Vec<&str> {
        targets_of(&self.edges, node_id)
    }

    /// Distinct sources of edges entering `node_id`, in edge order.
    pub fn predecessors(&self, node_id: &str) -> Vec<&str> {
        sources_of(&self.edges, node_id)
    }

    /// Check that every edge references a known node and the graph is acyclic.
    ///
    /// Instantiation does not call this; it is offered to callers that want
    /// to reject bad graphs before submitting them.
    pub fn validate_graph(&self) -> Result<(), FlowError> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut index = HashMap::new();

        for node in &self.nodes {
            index.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
        }

        for edge in &self.edges {
            let from = index.get(edge.source.as_str()).ok_or_else(|| {
                FlowError::InvalidConfig(format!(
                    "edge {} references unknown source {}",
                    edge.id, edge.source
                ))
            })?;
            let to = index.get(edge.target.as_str()).ok_or_else(|| {
                FlowError::InvalidConfig(format!(
                    "edge {} references unknown target {}",
                    edge.id, edge.target
                ))
            })?;
            graph.add_edge(*from, *to, ());
        }

        toposort(&graph, None).map_err(|cycle| {
            FlowError::InvalidConfig(format!(
                "cycle detected at node {}",
                graph[cycle.node_id()]
            ))
        })?;

        Ok(())
    }
}

pub(crate) fn targets_of<'a>(edges: &'a [EdgeConfig], node_id: &str) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter(|e| e.source == node_id)
        .map(|e| e.target.as_str())
        .filter(|t| seen.insert(*t))
        .collect()
}

pub(crate) fn sources_of<'a>(edges: &'a [EdgeConfig], node_id: &str) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter(|e| e.target == node_id)
        .map(|e| e.source.as_str())
        .filter(|s| seen.insert(*s))
        .collect()
}

/// Node specification in a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_type.into(),
            config: HashMap::new(),
            x: None,
            y: None,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }
}

/// Directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeConfig {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
}
