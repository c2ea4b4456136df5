//! Domain layer public interface.
//!
//! Broker-independent abstractions shared by the dispatcher and the RPC
//! client. Consumers import symbols via this module, not by referencing
//! individual files directly.

mod session;

pub use session::{
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
