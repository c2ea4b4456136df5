//! Broker session implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Session` trait and a single factory, [`connect`], that picks one by URI
//! scheme. Domain code must not depend on implementation-specific types.

mod amqp;
mod memory;

pub use amqp::connect_lapin;
pub use memory::MemoryBroker;

use crate::{log_debug, Result, RpcError, SessionPtr};

/// URI scheme prefix resolving to a process-wide [`MemoryBroker`].
pub const MEMORY_SCHEME: &str = "memory://";

/// Open a broker session for `uri`.
///
/// - `amqp://...` / `amqps://...` connect through lapin (feature
///   `transport_lapin`).
/// - `memory://<name>` attaches to the in-process broker registered under
///   `<name>`.
///
/// `session_id` only labels log lines.
///
/// # Errors
///
/// Returns [`RpcError::Transport`] for unreachable brokers and unsupported
/// schemes.
pub async fn connect(uri: &str, session_id: &str) -> Result<SessionPtr> {
    // ---
    if let Some(name) = uri.strip_prefix(MEMORY_SCHEME) {
        log_debug!("[{session_id}] using in-memory broker '{name}'");
        return MemoryBroker::named(name).connect().await;
    }

    if uri.starts_with("amqp://") || uri.starts_with("amqps://") {
        return connect_lapin(uri, session_id).await;
    }

    Err(RpcError::Transport(format!(
        "unsupported broker uri: {uri}, expected amqp://, amqps:// or memory://"
    )))
}
