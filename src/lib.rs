//! Request/reply RPC for microservices over a message broker.
//!
//! A [`Service`] consumes commands from a named queue and hands each one to a
//! [`CommandRunner`]; an [`RpcClient`] publishes requests tagged with a
//! correlation identifier and waits for the matching reply on its private
//! reply queue. Bodies are JSON: `{"Cmd": ..., "Params": {...}}` for requests,
//! `{"error": ..., "context": ...}` for failures.
//!
//! Brokers are reached through the [`Session`] trait: AMQP via lapin
//! (`amqp://`, feature `transport_lapin`) or the in-process [`MemoryBroker`]
//! (`memory://<name>`).
//!

// Import all sub modules once...
mod client;
mod domain;
mod polling;
mod protocol;
mod server;
mod transport;

mod config_file;
mod rpc_config;

mod error;
mod macros;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use client::RpcClient;
pub use server::{
    //
    shutdown_signal,
    BasicRunner,
    CommandRunner,
    RunnerPtr,
    Service,
    DISPATCHER_CONTEXT,
    EXECUTABLE_CONTEXT,
    EXECUTABLE_STAT_CONTEXT,
    PUBLISH_CONTEXT,
};

pub use rpc_config::{log_level, run_mode_name, RpcConfig, DEFAULT_BROKER_URI};
pub use config_file::{config_path, read_config, read_config_from, CONFIG_DIR};

pub use error::{Result, RpcError};

pub use polling::{PollingFetcher, RateLimiter};

pub use transport::{connect as connect_session, connect_lapin, MemoryBroker, MEMORY_SCHEME};

// --- public re-exports
pub use domain::{
    //
    AckMode,
    Acker,
    Consumer,
    Delivery,
    Properties,
    Queue,
    QueueOptions,
    Session,
    SessionPtr,
};

pub use protocol::{
    //
    CorrelationId,
    ErrorReply,
    Request,
    Version,
    CONTENT_TYPE_JSON,
};
