//! Reconnect backoff policy
//!
//! Pure delay computation: each consecutive failure adds one step, and
//! once the previous delay exceeds the ceiling the delay wraps back to a
//! single step. Retries continue indefinitely; the user should stay
//! live-connected as long as the client is open.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reconnect delay policy for a stream session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Increment added per consecutive failure, and the minimum delay.
    pub step: Duration,
    /// Once the previous delay exceeds this, the next delay resets to `step`.
    pub ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(5),
            ceiling: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Next reconnect delay given the previously scheduled one.
    ///
    /// The result is always within `[step, ceiling + step]`.
    pub fn next_delay(&self, previous: Duration) -> Duration {
        if previous > self.ceiling {
            self.step
        } else {
            previous + self.step
        }
    }
}
