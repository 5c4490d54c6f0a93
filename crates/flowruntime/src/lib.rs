//! Workflow orchestration runtime
//!
//! This crate provides the orchestrator (instantiation, completion handling,
//! dispatch, terminate), the worker loop and the executor registry, on top of
//! a pluggable store and message channel.

mod dispatcher;
mod instantiator;
mod locks;
mod registry;
mod resolver;
mod runtime;
mod store;
mod worker;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use instantiator::Instantiator;
pub use locks::{InstanceGuard, InstanceLocks};
pub use registry::{ExecutorPlugin, ExecutorRegistry};
pub use resolver::{Resolution, Resolver};
pub use runtime::{FlowRuntime, RuntimeConfig};
pub use store::{InstanceUpdate, MemoryStore, NodeUpdate, WorkflowStore};
pub use worker::{TaskWorker, WorkerOutcome};
