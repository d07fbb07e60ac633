//! External collaborator seams
//!
//! The sync core does not speak the wire protocol itself. It consumes an
//! already-decoded message stream from a transport implementation and
//! issues secondary fetches through a detail fetcher. Both are traits so
//! tests can script them.

use async_trait::async_trait;

use crate::stream::CancelToken;
use crate::types::error::TransportError;
use crate::types::{CalendarEntry, StreamMessage, SubscribeParams};

/// One item yielded by an open stream. A terminal `Err` carries the
/// failure that ended the stream; dropping the sender without an error
/// is a clean close.
pub type StreamItem = Result<StreamMessage, TransportError>;

/// Server-push channel provider.
///
/// `open_stream` resolves once the subscription is established and
/// returns the inbound message channel. The cancellation token is the
/// session's live handle; implementations should tear down the
/// underlying connection when it fires.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open_stream(
        &self,
        params: &SubscribeParams,
        cancel: CancelToken,
    ) -> Result<flume::Receiver<StreamItem>, TransportError>;
}

/// Request/response fetcher for richer payloads referenced by thin
/// stream messages. Failures here are logged by the caller and never
/// reach the stream's error path.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_calendar_entry(&self, id: &str) -> Result<CalendarEntry, TransportError>;
}
