//! Core abstractions for the flow engine
//!
//! This crate provides the types shared by the orchestrator and the workers:
//! definitions, instance records, the status model, the wire records that
//! travel over the message channel and the channel itself.

mod error;
pub mod events;
mod executor;
mod instance;
mod message;
mod status;
mod value;
mod workflow;

pub use error::{ChannelError, ExecutionError, FlowError};
pub use executor::{ExecutorMetadata, TaskExecutor, TaskResult};
pub use instance::{NodeInstance, NodeInstanceId, WorkflowInstance, WorkflowInstanceId};
pub use message::{CompletionEvent, StatusUpdate, TaskEnvelope};
pub use status::{NodeStatus, Outcome, WorkflowStatus};
pub use value::Value;
pub use workflow::{DefinitionId, EdgeConfig, NodeConfig, WorkflowConfig, WorkflowDefinition};
pub use events::*;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
