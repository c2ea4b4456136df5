// src/transport/memory/mod.rs

//! In-memory broker.
//!
//! A pure in-process implementation of the domain-level `Session` contract,
//! used by the test-suite, by local runs (`memory://` URIs) and as the
//! reference for session semantics.
//!
//! ## Reference Semantics
//!
//! - Publishing goes through a default exchange: the routing key names the
//!   destination queue, and a message for a queue that does not exist is
//!   dropped silently.
//! - Deliveries of one queue reach its consumer in publish order.
//! - A manual-ack consumer never holds more than `prefetch` unacknowledged
//!   deliveries (0 means unbounded).
//! - Named queues outlive the sessions consuming them: when a consumer's
//!   session closes, messages published afterwards wait for the next
//!   consumer.
//! - Exclusive queues belong to the declaring session and disappear, together
//!   with every consumer of that session, when the session closes.
//! - Every acknowledgement is recorded, so tests can assert how often each
//!   delivery was acknowledged.
//!
//! ## Non-Goals
//!
//! Persistence, redelivery of unacknowledged messages, and several consumers
//! sharing one queue are not emulated. A second consumer on a queue is
//! rejected while the first one is active.

mod transport;

pub use transport::MemoryBroker;
