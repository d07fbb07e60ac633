//! dispatch-live - Real-time sync core for the dispatch operations client
//!
//! Maintains long-lived server-push subscriptions, reconciles full and
//! chunked entity snapshots into in-memory collections, and fans typed
//! events out to independent domain reactors (livemap, notifications,
//! mail threads).
//!
//! ## Module Organization
//!
//! - `types/`: Data structures and error types
//! - `transport`: External collaborator seams (stream transport, detail fetcher)
//! - `stream/`: Stream session lifecycle, backoff and cancellation
//! - `reconcile/`: Snapshot reconciliation into live collections
//! - `router`: Inbound message classification and dispatch
//! - `reactors/`: Domain reactors owning the live collections
//! - `state/`: Explicitly constructed application context

pub mod reactors;
pub mod reconcile;
pub mod router;
pub mod state;
pub mod stream;
pub mod transport;
pub mod types;

pub use reactors::{LivemapReactor, MailerReactor, NotifierReactor};
pub use reconcile::{Delta, Merge, ReconciliationSet};
pub use router::{EventRouter, RouterVerdict};
pub use state::{LiveConfig, LiveContext};
pub use stream::{
    BackoffPolicy, CancelToken, ConnectionState, SessionConfig, SessionEvent, SessionStatus,
    StreamSession,
};
pub use transport::{DetailFetcher, StreamTransport};
pub use types::error::{ErrorCode, TransportError, SESSION_LOCK_SENTINEL};
pub use types::{StreamMessage, SubscribeParams};
