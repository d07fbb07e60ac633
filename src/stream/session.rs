//! Stream session lifecycle
//!
//! One `StreamSession` owns one logical server-push subscription:
//! `Idle -> Connecting -> Streaming -> {Idle, Reconnecting -> Connecting}`,
//! with `Failed` as a terminal state for non-retryable errors.
//!
//! The read loop consumes messages strictly one at a time: message N is
//! fully routed (reconciliation and synchronous reactor work included)
//! before N+1 is read, so downstream consumers observe server order.
//! Transient failures reconnect with capped backoff, indefinitely.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, Sender};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::router::{EventRouter, RouterVerdict};
use crate::stream::{BackoffPolicy, CancelToken};
use crate::transport::StreamTransport;
use crate::types::error::TransportError;
use crate::types::SubscribeParams;

/// Connection state, observable by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Streaming,
    Reconnecting,
    /// Non-retryable failure; needs caller intervention (e.g. re-auth)
    /// before another start.
    Failed,
}

/// Observable session status.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: ConnectionState,
    /// Scheduled delay before the next reconnect attempt, when reconnecting.
    pub retry_in: Option<Duration>,
    pub last_error: Option<String>,
}

/// Event emitted toward the UI layer.
#[derive(Debug, Clone, Serialize)]
pub enum SessionEvent {
    StatusChanged(SessionStatus),
    /// A non-retryable error; the session will not reconnect on its own.
    FatalError { error: TransportError },
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub params: SubscribeParams,
    pub backoff: BackoffPolicy,
}

impl SessionConfig {
    pub fn new(params: SubscribeParams) -> Self {
        Self {
            params,
            backoff: BackoffPolicy::default(),
        }
    }
}

struct Shared {
    status: RwLock<SessionStatus>,
    /// The live cancellation handle; at most one per session.
    token: Mutex<Option<CancelToken>>,
    /// Previously scheduled reconnect delay; input to the backoff policy.
    backoff: Mutex<Duration>,
    /// Bumped by every stop(). A scheduled reconnect captures the epoch
    /// when it is scheduled and abandons itself if it changed, so a
    /// session the caller intentionally stopped is never resurrected.
    stop_epoch: AtomicU64,
}

/// One logical long-lived subscription, resilient to transient failures.
///
/// Cheap to clone; clones share lifecycle state.
#[derive(Clone)]
pub struct StreamSession {
    transport: Arc<dyn StreamTransport>,
    router: Arc<EventRouter>,
    config: SessionConfig,
    shared: Arc<Shared>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl StreamSession {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        router: Arc<EventRouter>,
        config: SessionConfig,
    ) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            transport,
            router,
            config,
            shared: Arc::new(Shared {
                status: RwLock::new(SessionStatus {
                    state: ConnectionState::Idle,
                    retry_in: None,
                    last_error: None,
                }),
                token: Mutex::new(None),
                backoff: Mutex::new(Duration::ZERO),
                stop_epoch: AtomicU64::new(0),
            }),
            events_tx,
            events_rx,
        }
    }

    /// Channel of status changes and fatal errors for the UI layer.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.shared.status.read().await.clone()
    }

    /// Open the subscription. Idempotent: a second call while a live
    /// handle exists is a no-op.
    ///
    /// Returns an explicitly boxed future: the read loop's failure
    /// handling schedules `start()` again, and with an opaque `async fn`
    /// signature that self-reference makes the spawned futures mutually
    /// recursive and uncompilable. Boxing here erases the cycle.
    pub fn start(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.do_start())
    }

    async fn do_start(&self) {
        let token = {
            let mut slot = self.shared.token.lock().await;
            if slot.is_some() {
                debug!("[{}] start: stream already active", self.scope());
                return;
            }
            let token = CancelToken::new();
            *slot = Some(token.clone());
            token
        };

        self.set_status(|s| {
            s.state = ConnectionState::Connecting;
            s.retry_in = None;
            s.last_error = None;
        })
        .await;

        let session = self.clone();
        tokio::spawn(async move {
            session.run(token).await;
        });
    }

    /// Close the subscription. Idempotent; safe to call from any task and
    /// takes effect before the read loop processes another message. Also
    /// cancels a pending reconnect.
    pub async fn stop(&self) {
        self.shared.stop_epoch.fetch_add(1, Ordering::SeqCst);

        let token = self.shared.token.lock().await.take();
        let state = self.status().await.state;
        match token {
            Some(token) => {
                // The handle is cleared immediately so start() is never
                // blocked on the read loop's teardown.
                token.cancel();
                info!("[{}] session stopped", self.scope());
            }
            None if matches!(
                state,
                ConnectionState::Reconnecting | ConnectionState::Failed
            ) =>
            {
                debug!("[{}] stop: pending reconnect or failure cleared", self.scope());
            }
            None => {
                debug!("[{}] stop: no active stream", self.scope());
                return;
            }
        }

        self.set_status(|s| {
            s.state = ConnectionState::Idle;
            s.retry_in = None;
        })
        .await;
    }

    /// Schedule a reconnect with the next backoff delay. No-op without a
    /// live handle or when the handle is already cancelled.
    pub async fn restart(&self) {
        {
            let slot = self.shared.token.lock().await;
            match slot.as_ref() {
                Some(token) if !token.is_cancelled() => {}
                _ => {
                    debug!("[{}] restart skipped: no active stream", self.scope());
                    return;
                }
            }
        }

        let delay = {
            let mut previous = self.shared.backoff.lock().await;
            let next = self.config.backoff.next_delay(*previous);
            *previous = next;
            next
        };

        // Captured when the reconnect is scheduled, not when it fires.
        let epoch = self.shared.stop_epoch.load(Ordering::SeqCst);

        self.cancel_current().await;
        self.set_status(|s| {
            s.state = ConnectionState::Reconnecting;
            s.retry_in = Some(delay);
        })
        .await;
        info!("[{}] reconnecting in {:?}", self.scope(), delay);

        let session = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if session.shared.stop_epoch.load(Ordering::SeqCst) != epoch {
                debug!("[{}] reconnect abandoned: session was stopped", session.scope());
                return;
            }
            session.start().await;
        });
    }

    fn scope(&self) -> &str {
        &self.config.params.scope
    }

    /// Cancel and clear the live handle without touching the stop epoch
    /// or the observable state. Used by the restart paths.
    async fn cancel_current(&self) {
        if let Some(token) = self.shared.token.lock().await.take() {
            token.cancel();
        }
    }

    async fn run(&self, token: CancelToken) {
        debug!("[{}] opening stream", self.scope());
        let inbound = match self
            .transport
            .open_stream(&self.config.params, token.clone())
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                self.handle_failure(e, &token).await;
                return;
            }
        };

        // Backoff resets once a connection is established.
        *self.shared.backoff.lock().await = Duration::ZERO;
        self.set_status(|s| {
            s.state = ConnectionState::Streaming;
            s.retry_in = None;
            s.last_error = None;
        })
        .await;
        info!("[{}] streaming", self.scope());

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!("[{}] read loop cancelled", self.scope());
                    return;
                }
                item = inbound.recv_async() => match item {
                    Ok(Ok(message)) => {
                        // Message N is fully routed before N+1 is read.
                        match self.router.route(message).await {
                            RouterVerdict::Continue => {}
                            RouterVerdict::Restart => {
                                self.force_restart().await;
                                return;
                            }
                        }
                    }
                    Ok(Err(error)) => {
                        self.handle_failure(error, &token).await;
                        return;
                    }
                    Err(_) => {
                        self.finish_clean(&token).await;
                        return;
                    }
                },
            }
        }
    }

    /// Normal stream termination: release the handle and return to Idle.
    async fn finish_clean(&self, token: &CancelToken) {
        {
            let mut slot = self.shared.token.lock().await;
            match slot.as_ref() {
                Some(current) if current.same_as(token) => *slot = None,
                // stop() already cleared us, or a newer session took over.
                _ => return,
            }
        }
        info!("[{}] stream ended", self.scope());
        self.set_status(|s| {
            s.state = ConnectionState::Idle;
            s.retry_in = None;
        })
        .await;
    }

    async fn handle_failure(&self, error: TransportError, token: &CancelToken) {
        if error.is_cancellation() {
            if token.is_cancelled() {
                // Our own stop(); not an error.
                debug!("[{}] stream cancelled", self.scope());
                return;
            }
            // Aborted from outside while we believed ourselves live.
            warn!("[{}] stream aborted externally: {}", self.scope(), error);
            self.restart().await;
            return;
        }

        if error.is_fatal() {
            error!("[{}] fatal stream error: {}", self.scope(), error);
            {
                let mut slot = self.shared.token.lock().await;
                if matches!(slot.as_ref(), Some(current) if current.same_as(token)) {
                    *slot = None;
                }
            }
            self.set_status(|s| {
                s.state = ConnectionState::Failed;
                s.retry_in = None;
                s.last_error = Some(error.to_string());
            })
            .await;
            self.emit(SessionEvent::FatalError { error });
            return;
        }

        warn!("[{}] stream failed: {}", self.scope(), error);
        self.restart().await;
    }

    /// Server-initiated restart: known-good request, so the backoff
    /// accumulated from organic failures is bypassed.
    async fn force_restart(&self) {
        info!("[{}] server requested reconnect, restarting now", self.scope());
        *self.shared.backoff.lock().await = Duration::ZERO;

        let epoch = self.shared.stop_epoch.load(Ordering::SeqCst);
        self.cancel_current().await;
        self.set_status(|s| {
            s.state = ConnectionState::Reconnecting;
            s.retry_in = None;
        })
        .await;

        if self.shared.stop_epoch.load(Ordering::SeqCst) == epoch {
            self.start().await;
        }
    }

    async fn set_status<F>(&self, update_fn: F)
    where
        F: FnOnce(&mut SessionStatus),
    {
        let mut status = self.shared.status.write().await;
        update_fn(&mut status);
        self.emit(SessionEvent::StatusChanged(status.clone()));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }
}
