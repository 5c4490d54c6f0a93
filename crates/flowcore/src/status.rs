//! Lifecycle states for workflow and node instances.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a single node instance.
///
/// `Pending -> Running -> {Success, Failed}`; `Terminated` is only reachable
/// from `Pending` or `Running` through an explicit terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failed,
    Terminated,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Terminated)
    }

    pub fn can_transition_to(self, next: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Success)
                | (Running, Failed)
                | (Pending, Terminated)
                | (Running, Terminated)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Terminated => "TERMINATED",
        }
    }
}

/// Status of a workflow instance. Leaves `Running` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Running,
    Success,
    Failed,
    Terminated,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        self == Self::Running && next.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Terminated => "TERMINATED",
        }
    }
}

/// Outcome reported by a worker for a finished node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failed,
}

impl From<Outcome> for NodeStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => NodeStatus::Success,
            Outcome::Failed => NodeStatus::Failed,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(NodeStatus::from(*self).as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "TERMINATED" => Ok(Self::Terminated),
            other => Err(format!("unknown node status: {}", other)),
        }
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "TERMINATED" => Ok(Self::Terminated),
            other => Err(format!("unknown workflow status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_transitions_are_monotonic() {
        assert!(NodeStatus::Pending.can_transition_to(NodeStatus::Running));
        assert!(NodeStatus::Running.can_transition_to(NodeStatus::Success));
        assert!(NodeStatus::Running.can_transition_to(NodeStatus::Failed));
        assert!(!NodeStatus::Pending.can_transition_to(NodeStatus::Success));
        assert!(!NodeStatus::Success.can_transition_to(NodeStatus::Running));
        assert!(!NodeStatus::Failed.can_transition_to(NodeStatus::Success));
    }

    #[test]
    fn terminated_is_not_reactivatable() {
        assert!(NodeStatus::Pending.can_transition_to(NodeStatus::Terminated));
        assert!(NodeStatus::Running.can_transition_to(NodeStatus::Terminated));
        assert!(!NodeStatus::Success.can_transition_to(NodeStatus::Terminated));
        for next in [
            NodeStatus::Pending,
            NodeStatus::Running,
            NodeStatus::Success,
            NodeStatus::Failed,
        ] {
            assert!(!NodeStatus::Terminated.can_transition_to(next));
        }
    }

    #[test]
    fn workflow_leaves_running_once() {
        assert!(WorkflowStatus::Running.can_transition_to(WorkflowStatus::Success));
        assert!(WorkflowStatus::Running.can_transition_to(WorkflowStatus::Terminated));
        assert!(!WorkflowStatus::Running.can_transition_to(WorkflowStatus::Running));
        assert!(!WorkflowStatus::Failed.can_transition_to(WorkflowStatus::Success));
    }

    #[test]
    fn statuses_use_upper_case_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&NodeStatus::Terminated).unwrap(),
            r#""TERMINATED""#
        );
        let outcome: Outcome = serde_json::from_str(r#""FAILED""#).unwrap();
        assert_eq!(NodeStatus::from(outcome), NodeStatus::Failed);
        assert_eq!("SUCCESS".parse::<WorkflowStatus>(), Ok(WorkflowStatus::Success));
    }
}
