//! Inbound message routing
//!
//! Classifies one decoded stream message by its discriminant and
//! dispatches it to exactly one domain reactor. Routing for message N
//! completes before the session reads message N+1, so events reach each
//! reactor in the original server order. Reactors that need asynchronous
//! follow-ups spawn them on their own tasks and never throw back into
//! the router.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::reactors::{LivemapReactor, MailerReactor, NotifierReactor};
use crate::types::StreamMessage;

/// Signal from the router back to the session's read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterVerdict {
    Continue,
    /// The server asked the client to reconnect.
    Restart,
}

pub struct EventRouter {
    livemap: Arc<LivemapReactor>,
    notifier: Arc<NotifierReactor>,
    mailer: Arc<MailerReactor>,
}

impl EventRouter {
    pub fn new(
        livemap: Arc<LivemapReactor>,
        notifier: Arc<NotifierReactor>,
        mailer: Arc<MailerReactor>,
    ) -> Self {
        Self {
            livemap,
            notifier,
            mailer,
        }
    }

    /// Route one inbound message to its reactor.
    pub async fn route(&self, message: StreamMessage) -> RouterVerdict {
        trace!("routing {}", message.kind());
        match message {
            StreamMessage::JobsSnapshot { jobs } => {
                self.livemap.apply_jobs(jobs).await;
            }
            StreamMessage::MarkerSnapshot { markers } => {
                self.livemap.apply_markers(markers).await;
            }
            StreamMessage::UserSnapshot { users, part } => {
                self.livemap.apply_users(users, part).await;
            }
            StreamMessage::Notification(notification) => {
                self.notifier.handle_incoming(notification).await;
            }
            StreamMessage::MailThreadUpdate(update) => {
                self.mailer.apply_update(update).await;
            }
            StreamMessage::UnreadCount { count } => {
                self.notifier.set_unread(count);
            }
            StreamMessage::Keepalive => {
                trace!("keepalive");
            }
            StreamMessage::RestartRequested => {
                debug!("server requested reconnect");
                return RouterVerdict::Restart;
            }
            StreamMessage::Unknown { kind, .. } => {
                // Forward compatible with server-side message additions.
                warn!("dropping message with unknown kind: {}", kind);
            }
        }
        RouterVerdict::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MapMarker, Notification, NotificationCategory};

    fn router() -> (EventRouter, Arc<LivemapReactor>, Arc<NotifierReactor>, Arc<MailerReactor>) {
        let livemap = Arc::new(LivemapReactor::new());
        let notifier = Arc::new(NotifierReactor::new(None));
        let mailer = Arc::new(MailerReactor::new());
        (
            EventRouter::new(livemap.clone(), notifier.clone(), mailer.clone()),
            livemap,
            notifier,
            mailer,
        )
    }

    #[tokio::test]
    async fn each_kind_reaches_exactly_one_reactor() {
        let (router, livemap, notifier, mailer) = router();

        let verdict = router
            .route(StreamMessage::MarkerSnapshot {
                markers: vec![MapMarker {
                    id: "m1".to_string(),
                    name: "hq".to_string(),
                    ..Default::default()
                }],
            })
            .await;
        assert_eq!(verdict, RouterVerdict::Continue);

        router
            .route(StreamMessage::Notification(Notification {
                id: "n1".to_string(),
                title: "backup requested".to_string(),
                category: NotificationCategory::Dispatch,
                ..Default::default()
            }))
            .await;

        router.route(StreamMessage::UnreadCount { count: 4 }).await;

        assert_eq!(livemap.markers_snapshot().await.len(), 1);
        assert_eq!(notifier.queue_snapshot().await.len(), 1);
        assert_eq!(notifier.unread(), 4);
        assert!(mailer.threads_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn restart_request_returns_restart_verdict() {
        let (router, ..) = router();
        assert_eq!(
            router.route(StreamMessage::RestartRequested).await,
            RouterVerdict::Restart
        );
        assert_eq!(
            router.route(StreamMessage::Keepalive).await,
            RouterVerdict::Continue
        );
    }

    #[tokio::test]
    async fn unknown_kind_is_dropped_without_side_effects() {
        let (router, livemap, notifier, mailer) = router();

        let verdict = router
            .route(StreamMessage::Unknown {
                kind: "futureThing".to_string(),
                payload: serde_json::json!({ "x": 1 }),
            })
            .await;

        assert_eq!(verdict, RouterVerdict::Continue);
        assert!(livemap.markers_snapshot().await.is_empty());
        assert!(notifier.queue_snapshot().await.is_empty());
        assert!(mailer.threads_snapshot().await.is_empty());
    }
}
