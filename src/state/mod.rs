//! Application context
//!
//! The live context is constructed explicitly and passed through the
//! application's dependency graph instead of living in module-level
//! globals. It owns the domain reactors, the router, and one stream
//! session per subscription (livemap and notifier).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::reactors::{LivemapReactor, MailerReactor, NotifierReactor};
use crate::router::EventRouter;
use crate::stream::{BackoffPolicy, SessionConfig, StreamSession};
use crate::transport::{DetailFetcher, StreamTransport};
use crate::types::SubscribeParams;

/// Configuration for the live context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    pub livemap_params: SubscribeParams,
    pub notifier_params: SubscribeParams,
    pub backoff: BackoffPolicy,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            livemap_params: SubscribeParams::new("livemap"),
            notifier_params: SubscribeParams::new("notifier"),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Owns every piece of the sync core for one signed-in user.
pub struct LiveContext {
    livemap: Arc<LivemapReactor>,
    notifier: Arc<NotifierReactor>,
    mailer: Arc<MailerReactor>,
    livemap_session: StreamSession,
    notifier_session: StreamSession,
}

impl LiveContext {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        fetcher: Option<Arc<dyn DetailFetcher>>,
        config: LiveConfig,
    ) -> Self {
        let livemap = Arc::new(LivemapReactor::new());
        let notifier = Arc::new(NotifierReactor::new(fetcher));
        let mailer = Arc::new(MailerReactor::new());

        let router = Arc::new(EventRouter::new(
            livemap.clone(),
            notifier.clone(),
            mailer.clone(),
        ));

        let livemap_session = StreamSession::new(
            transport.clone(),
            router.clone(),
            SessionConfig {
                params: config.livemap_params,
                backoff: config.backoff,
            },
        );
        let notifier_session = StreamSession::new(
            transport,
            router,
            SessionConfig {
                params: config.notifier_params,
                backoff: config.backoff,
            },
        );

        Self {
            livemap,
            notifier,
            mailer,
            livemap_session,
            notifier_session,
        }
    }

    pub fn livemap(&self) -> &Arc<LivemapReactor> {
        &self.livemap
    }

    pub fn notifier(&self) -> &Arc<NotifierReactor> {
        &self.notifier
    }

    pub fn mailer(&self) -> &Arc<MailerReactor> {
        &self.mailer
    }

    pub fn livemap_session(&self) -> &StreamSession {
        &self.livemap_session
    }

    pub fn notifier_session(&self) -> &StreamSession {
        &self.notifier_session
    }

    /// Start every subscription. Sessions are independent; there is no
    /// ordering guarantee between them.
    pub async fn start(&self) {
        info!("starting live subscriptions");
        self.livemap_session.start().await;
        self.notifier_session.start().await;
    }

    /// Stop every subscription (e.g. on sign-out).
    pub async fn shutdown(&self) {
        info!("shutting down live subscriptions");
        self.livemap_session.stop().await;
        self.notifier_session.stop().await;
    }
}
