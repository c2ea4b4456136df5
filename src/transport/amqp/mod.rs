//! AMQP broker sessions.
//!
//! Currently supports:
//! - lapin - AMQP 0-9-1 (RabbitMQ)

#[cfg(feature = "transport_lapin")]
mod lapin;

#[cfg(feature = "transport_lapin")]
pub use self::lapin::connect as connect_lapin;

#[cfg(not(feature = "transport_lapin"))]
pub async fn connect_lapin(_uri: &str, _session_id: &str) -> crate::Result<crate::SessionPtr> {
    Err(crate::RpcError::Transport(
        "transport_lapin feature is not enabled".into(),
    ))
}
