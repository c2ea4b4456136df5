//! Wire protocol types.
//!
//! Request bodies, error reply bodies, the `info` record and correlation
//! identifiers. Correlation identifiers and reply addresses travel in message
//! properties; everything here that touches a body is JSON.
mod correlation;
mod request;
mod version;

pub use correlation::CorrelationId;
pub use request::{ErrorReply, Request, CONTENT_TYPE_JSON};
pub use version::Version;
