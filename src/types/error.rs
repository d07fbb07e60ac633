//! Error types for the sync core
//!
//! Transport failures carry a gRPC-style code plus a message string. The
//! session inspects the code to decide between retry and surface, and the
//! message for known fatal conditions that must not be retried silently.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message substring the server uses to signal that this account's live
/// session is already held by another client. Retrying would just bounce
/// the other session, so this is treated as fatal.
pub const SESSION_LOCK_SENTINEL: &str = "session is locked by another client";

/// Transport-level status codes, mirroring the subset the RPC layer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Cancelled,
    Aborted,
    Unavailable,
    Unauthenticated,
    Internal,
    Unknown,
}

/// Error surfaced by the stream transport or a secondary fetch.
///
/// Serializable so fatal errors can be forwarded to the frontend as-is.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct TransportError {
    pub code: ErrorCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether this error is a cancellation/abort outcome. These are only
    /// real failures when the session did not cancel itself.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.code, ErrorCode::Cancelled | ErrorCode::Aborted)
    }

    /// Whether this error requires caller intervention instead of a retry
    /// (re-authentication, or the account's session is locked elsewhere).
    pub fn is_fatal(&self) -> bool {
        self.code == ErrorCode::Unauthenticated || self.message.contains(SESSION_LOCK_SENTINEL)
    }
}
