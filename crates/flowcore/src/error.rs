use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid workflow config: {0}")]
    InvalidConfig(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Unsupported task type: {0}")]
    UnsupportedType(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl FlowError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Errors raised by task executors while running a single node.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Invalid config value for '{field}': expected {expected}")]
    InvalidConfig { field: String, expected: String },

    #[error("{0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone)]
pub enum ChannelError {
    #[error("Failed to connect to message broker: {0}")]
    ConnectionFailed(String),

    #[error("Failed to publish message: {0}")]
    PublishFailed(String),

    #[error("Failed to poll messages: {0}")]
    PollFailed(String),

    #[error("Channel closed")]
    Closed,
}
