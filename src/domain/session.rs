// src/domain/session.rs

//! Broker session domain abstractions.
//!
//! This module defines the contract the dispatcher and the RPC client rely on
//! when talking to a message broker: declare a queue, bound the number of
//! unacknowledged deliveries, consume, publish and acknowledge. It does not
//! name any concrete client library.
//!
//! Every publish goes through the broker's default exchange, so the routing
//! key is simply the destination queue name.
//!
//! Concrete implementations live under `src/transport/`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{Result, RpcError};

/// Queue declaration flags.
///
/// Queues are never message-durable. The two flags that matter to the RPC
/// pattern are exclusivity and deletion when unused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Only the declaring session may consume; the queue dies with it.
    pub exclusive: bool,
    /// Delete the queue once its last consumer goes away.
    pub auto_delete: bool,
}

impl QueueOptions {
    /// Options for a service's named request queue: shared, kept when idle.
    pub fn service() -> Self {
        // ---
        Self {
            exclusive: false,
            auto_delete: false,
        }
    }

    /// Options for a client's private reply queue.
    pub fn reply() -> Self {
        // ---
        Self {
            exclusive: true,
            auto_delete: true,
        }
    }
}

/// A declared queue. The name is broker-assigned for anonymous declarations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Queue(Arc<str>);

impl Queue {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How deliveries of a consumer are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// The consumer must call [`Delivery::ack`] exactly once per delivery.
    Manual,
    /// The broker treats a message as handled once it is delivered.
    Auto,
}

/// Message properties carried next to the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    pub content_type: Option<Arc<str>>,
    pub correlation_id: Option<Arc<str>>,
    pub reply_to: Option<Arc<str>>,
}

impl Properties {
    /// Properties for a request: where to answer and how to tag the answer.
    pub fn request(content_type: &str, correlation_id: &str, reply_to: &str) -> Self {
        // ---
        Self {
            content_type: Some(Arc::from(content_type)),
            correlation_id: Some(Arc::from(correlation_id)),
            reply_to: Some(Arc::from(reply_to)),
        }
    }

    /// Properties for a reply to the request tagged `correlation_id`.
    pub fn reply(content_type: &str, correlation_id: &str) -> Self {
        // ---
        Self {
            content_type: Some(Arc::from(content_type)),
            correlation_id: Some(Arc::from(correlation_id)),
            reply_to: None,
        }
    }
}

/// Acknowledgement capability handed out with manual-ack deliveries.
#[async_trait::async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self, delivery_tag: u64) -> Result<()>;

    /// Told about every repeated [`Delivery::ack`] call, which is refused
    /// before reaching [`ack`](Self::ack).
    fn repeated_ack(&self, _delivery_tag: u64) {}
}

/// One message received from a queue.
///
/// A manual-ack delivery carries the obligation to be acknowledged exactly
/// once. The first [`ack`](Self::ack) call is forwarded to the broker, any
/// later call fails with [`RpcError::AlreadyAcknowledged`] without reaching
/// the broker.
pub struct Delivery {
    // ---
    tag: u64,
    body: Bytes,
    properties: Properties,
    acker: Option<Arc<dyn Acker>>,
    acked: AtomicBool,
}

impl Delivery {
    /// Build a delivery. `acker` is `None` for auto-acknowledged consumers.
    pub fn new(
        tag: u64,
        body: Bytes,
        properties: Properties,
        acker: Option<Arc<dyn Acker>>,
    ) -> Self {
        // ---
        Self {
            tag,
            body,
            properties,
            acker,
            acked: AtomicBool::new(false),
        }
    }

    pub fn delivery_tag(&self) -> u64 {
        self.tag
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Correlation identifier, empty when the sender did not set one.
    pub fn correlation_id(&self) -> &str {
        self.properties.correlation_id.as_deref().unwrap_or("")
    }

    /// Reply-to queue, empty when the sender did not set one.
    pub fn reply_to(&self) -> &str {
        self.properties.reply_to.as_deref().unwrap_or("")
    }

    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::SeqCst)
    }

    /// Acknowledge this delivery.
    pub async fn ack(&self) -> Result<()> {
        // ---
        if self.acked.swap(true, Ordering::SeqCst) {
            if let Some(acker) = &self.acker {
                acker.repeated_ack(self.tag);
            }
            return Err(RpcError::AlreadyAcknowledged(self.tag));
        }

        match &self.acker {
            Some(acker) => acker.ack(self.tag).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("correlation_id", &self.correlation_id())
            .field("reply_to", &self.reply_to())
            .field("body_len", &self.body.len())
            .field("acked", &self.is_acked())
            .finish()
    }
}

/// Lazy, in-order sequence of deliveries from one queue.
///
/// The sequence ends when the owning session is closed or the broker cancels
/// the consumer; it cannot be restarted except by reconnecting.
pub struct Consumer {
    // ---
    /// Receiver channel fed by the session's background consumer task.
    pub inbox: mpsc::Receiver<Delivery>,
}

impl Consumer {
    pub fn new(inbox: mpsc::Receiver<Delivery>) -> Self {
        Self { inbox }
    }

    /// Next delivery in arrival order, `None` once the sequence is exhausted.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.inbox.recv().await
    }
}

/// Broker session: one connection plus one channel.
///
/// Each component owns exactly one session; concurrent use from unrelated
/// tasks goes through the implementation's own serialization.
///
/// Every failure is reported as [`RpcError::Transport`].
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    // ---
    /// Identifier used in log lines.
    fn session_id(&self) -> &str;

    /// Declare a queue. An empty `name` asks the broker to pick one.
    async fn declare_queue(&self, name: &str, opts: QueueOptions) -> Result<Queue>;

    /// Bound the number of unacknowledged deliveries held by this session.
    async fn set_prefetch(&self, count: u16) -> Result<()>;

    /// Start consuming from `queue`.
    async fn consume(&self, queue: &Queue, mode: AckMode) -> Result<Consumer>;

    /// Publish `body` to the queue named `routing_key` via the default exchange.
    async fn publish(&self, routing_key: &str, props: Properties, body: Bytes) -> Result<()>;

    /// Close the session, ending its consumers and dropping exclusive queues.
    async fn close(&self) -> Result<()>;
}

/// Shared session pointer.
pub type SessionPtr = Arc<dyn Session>;
