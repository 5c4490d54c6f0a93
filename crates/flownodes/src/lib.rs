//! Standard executor library
//!
//! Built-in task executors: outbound HTTP, notifications, model calls and a
//! couple of utilities.

mod ai;
mod debug;
mod email;
mod http;
mod time;

pub use ai::{AiEndpoint, AiExecutor};
pub use debug::DebugExecutor;
pub use email::EmailExecutor;
pub use http::HttpExecutor;
pub use time::DelayExecutor;
use flowruntime::ExecutorRegistry;

use std::sync::Arc;

/// Register all standard executors with a registry.
///
/// Executors that talk to the network share `client`.
pub fn register_all(
    registry: &mut ExecutorRegistry,
    client: reqwest::Client,
    ai_endpoint: Option<AiEndpoint>,
) {
    registry.register(Arc::new(HttpExecutor::new(client.clone())));
    registry.register(Arc::new(EmailExecutor));
    registry.register(Arc::new(AiExecutor::new(client, ai_endpoint)));
    registry.register(Arc::new(DebugExecutor));
    registry.register(Arc::new(DelayExecutor));
}
