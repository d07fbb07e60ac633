//! Stream session lifecycle
//!
//! One `StreamSession` per logical subscription: it opens the transport
//! channel, consumes messages strictly in arrival order, and survives
//! transient failures via capped backoff.

mod backoff;
mod cancel;
mod session;

pub use backoff::BackoffPolicy;
pub use cancel::CancelToken;
pub use session::{ConnectionState, SessionConfig, SessionEvent, SessionStatus, StreamSession};
