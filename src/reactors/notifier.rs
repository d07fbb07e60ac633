//! Notification reactor
//!
//! Owns the presentation queue of notifications and the unread counter.
//! Handles do-not-disturb suppression, at-most-once sound triggering per
//! notification, and fetch-on-demand of the richer calendar payload a
//! thin notification may reference. A failed secondary fetch is logged
//! and never reaches the stream's error path.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use flume::{Receiver, Sender};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transport::DetailFetcher;
use crate::types::{CalendarEntry, Notification, NotificationCategory};

/// Oldest queue entries are evicted past this, so an unattended client
/// does not accumulate notifications without bound.
const MAX_QUEUE_LEN: usize = 100;

/// Notification changes for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub enum NotifierEvent {
    Added(Notification),
    /// Play the notification sound. Emitted at most once per notification id.
    PlaySound { id: String },
    UnreadChanged { count: u64 },
    DetailFetched { notification_id: String },
}

pub struct NotifierReactor {
    queue: RwLock<Vec<Notification>>,
    unread: AtomicU64,
    do_not_disturb: AtomicBool,
    /// Ids that already triggered a sound, so re-deliveries stay silent.
    sounded: RwLock<HashSet<String>>,
    /// Calendar entries fetched on demand, keyed by notification id.
    details: Arc<RwLock<HashMap<String, CalendarEntry>>>,
    fetcher: Option<Arc<dyn DetailFetcher>>,
    events_tx: Sender<NotifierEvent>,
    events_rx: Receiver<NotifierEvent>,
}

impl NotifierReactor {
    pub fn new(fetcher: Option<Arc<dyn DetailFetcher>>) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            queue: RwLock::new(Vec::new()),
            unread: AtomicU64::new(0),
            do_not_disturb: AtomicBool::new(false),
            sounded: RwLock::new(HashSet::new()),
            details: Arc::new(RwLock::new(HashMap::new())),
            fetcher,
            events_tx,
            events_rx,
        }
    }

    pub fn subscribe(&self) -> Receiver<NotifierEvent> {
        self.events_rx.clone()
    }

    pub fn set_do_not_disturb(&self, active: bool) {
        info!("do not disturb: {}", active);
        self.do_not_disturb.store(active, Ordering::SeqCst);
    }

    pub fn do_not_disturb(&self) -> bool {
        self.do_not_disturb.load(Ordering::SeqCst)
    }

    /// Handle one server-pushed notification.
    ///
    /// While do-not-disturb is active the notification is suppressed
    /// entirely: no sound, no queue entry. The unread counter is driven
    /// by separately signaled count updates and still applies.
    pub async fn handle_incoming(&self, notification: Notification) {
        if self.do_not_disturb() {
            debug!("notification {} suppressed (do not disturb)", notification.id);
            return;
        }

        if self.mark_sounded(&notification.id).await {
            self.emit(NotifierEvent::PlaySound {
                id: notification.id.clone(),
            });
        }

        if let Some(entry_id) = notification.calendar_entry_id.clone() {
            self.spawn_detail_fetch(notification.id.clone(), entry_id);
        }

        self.enqueue(notification).await;
    }

    /// Merge a UI-originated notification into the same presentation
    /// queue as server-pushed ones. Local notifications are intentional
    /// user actions, so they bypass do-not-disturb and stay silent.
    pub async fn add_local(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
        category: NotificationCategory,
    ) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            body: body.into(),
            category,
            calendar_entry_id: None,
            created_at: Some(Utc::now()),
            read: false,
        };
        self.enqueue(notification.clone()).await;
        notification
    }

    /// Apply a separately signaled unread counter update. Applies even
    /// while do-not-disturb is active.
    pub fn set_unread(&self, count: u64) {
        let previous = self.unread.swap(count, Ordering::SeqCst);
        if previous != count {
            self.emit(NotifierEvent::UnreadChanged { count });
        }
    }

    pub fn unread(&self) -> u64 {
        self.unread.load(Ordering::SeqCst)
    }

    pub async fn queue_snapshot(&self) -> Vec<Notification> {
        self.queue.read().await.clone()
    }

    pub async fn detail_for(&self, notification_id: &str) -> Option<CalendarEntry> {
        self.details.read().await.get(notification_id).cloned()
    }

    async fn enqueue(&self, notification: Notification) {
        let evicted = {
            let mut queue = self.queue.write().await;
            // Re-deliveries update the existing entry instead of duplicating it.
            if let Some(existing) = queue.iter_mut().find(|n| n.id == notification.id) {
                *existing = notification;
                return;
            }
            queue.push(notification.clone());
            if queue.len() > MAX_QUEUE_LEN {
                Some(queue.remove(0))
            } else {
                None
            }
        };
        // Evicted ids also leave the sound and detail bookkeeping, which
        // would otherwise grow for the life of the session.
        if let Some(old) = evicted {
            debug!("notification {} evicted from full queue", old.id);
            self.sounded.write().await.remove(&old.id);
            self.details.write().await.remove(&old.id);
        }
        self.emit(NotifierEvent::Added(notification));
    }

    /// Record that this id triggered its sound. Returns true only the
    /// first time an id is seen.
    async fn mark_sounded(&self, id: &str) -> bool {
        self.sounded.write().await.insert(id.to_string())
    }

    fn spawn_detail_fetch(&self, notification_id: String, entry_id: String) {
        let fetcher = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => return,
        };
        let details = Arc::clone(&self.details);
        let events_tx = self.events_tx.clone();

        // Fired and tracked independently of the read loop; a failure
        // here must never surface on the stream's error path.
        tokio::spawn(async move {
            match fetcher.fetch_calendar_entry(&entry_id).await {
                Ok(entry) => {
                    debug!(
                        "fetched calendar entry {} for notification {}",
                        entry_id, notification_id
                    );
                    details.write().await.insert(notification_id.clone(), entry);
                    let _ = events_tx.send(NotifierEvent::DetailFetched { notification_id });
                }
                Err(e) => {
                    warn!(
                        "failed to fetch calendar entry {} for notification {}: {}",
                        entry_id, notification_id, e
                    );
                }
            }
        });
    }

    fn emit(&self, event: NotifierEvent) {
        let _ = self.events_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::error::{ErrorCode, TransportError};
    use async_trait::async_trait;

    fn notification(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            title: format!("notification {}", id),
            body: String::new(),
            category: NotificationCategory::Dispatch,
            calendar_entry_id: None,
            created_at: Some(Utc::now()),
            read: false,
        }
    }

    struct StubFetcher {
        fail: bool,
    }

    #[async_trait]
    impl DetailFetcher for StubFetcher {
        async fn fetch_calendar_entry(&self, id: &str) -> Result<CalendarEntry, TransportError> {
            if self.fail {
                Err(TransportError::new(ErrorCode::Unavailable, "fetch failed"))
            } else {
                Ok(CalendarEntry {
                    id: id.to_string(),
                    title: "shift briefing".to_string(),
                    body: None,
                    starts_at: None,
                })
            }
        }
    }

    #[tokio::test]
    async fn sound_plays_at_most_once_per_id() {
        let reactor = NotifierReactor::new(None);
        let events = reactor.subscribe();

        reactor.handle_incoming(notification("n1")).await;
        reactor.handle_incoming(notification("n1")).await;

        let sounds = events
            .drain()
            .into_iter()
            .filter(|e| matches!(e, NotifierEvent::PlaySound { .. }))
            .count();
        assert_eq!(sounds, 1);
        assert_eq!(reactor.queue_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn do_not_disturb_suppresses_queue_and_sound_but_not_unread() {
        let reactor = NotifierReactor::new(None);
        let events = reactor.subscribe();
        reactor.set_do_not_disturb(true);

        reactor.handle_incoming(notification("n1")).await;
        // Unread counter arrives as its own signal and still applies.
        reactor.set_unread(3);

        assert!(reactor.queue_snapshot().await.is_empty());
        assert_eq!(reactor.unread(), 3);
        let any_sound = events
            .drain()
            .into_iter()
            .any(|e| matches!(e, NotifierEvent::PlaySound { .. } | NotifierEvent::Added(_)));
        assert!(!any_sound, "no sound and no queue entry under do not disturb");
    }

    #[tokio::test]
    async fn local_notifications_share_the_queue() {
        let reactor = NotifierReactor::new(None);
        reactor.handle_incoming(notification("n1")).await;
        let local = reactor
            .add_local("copied", "waypoint copied to clipboard", NotificationCategory::General)
            .await;

        let queue = reactor.queue_snapshot().await;
        assert_eq!(queue.len(), 2);
        assert!(queue.iter().any(|n| n.id == local.id));
    }

    #[tokio::test]
    async fn referenced_calendar_entry_is_fetched_on_demand() {
        let reactor = NotifierReactor::new(Some(Arc::new(StubFetcher { fail: false })));
        let events = reactor.subscribe();

        let mut thin = notification("n1");
        thin.calendar_entry_id = Some("cal-7".to_string());
        reactor.handle_incoming(thin).await;

        // The fetch runs on its own task.
        let fetched = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            loop {
                if let Ok(NotifierEvent::DetailFetched { notification_id }) = events.recv_async().await
                {
                    return notification_id;
                }
            }
        })
        .await
        .expect("detail fetch should complete");

        assert_eq!(fetched, "n1");
        let entry = reactor.detail_for("n1").await.expect("entry cached");
        assert_eq!(entry.id, "cal-7");
    }

    #[tokio::test]
    async fn failed_detail_fetch_is_not_fatal() {
        let reactor = NotifierReactor::new(Some(Arc::new(StubFetcher { fail: true })));

        let mut thin = notification("n1");
        thin.calendar_entry_id = Some("cal-7".to_string());
        reactor.handle_incoming(thin).await;

        // Give the spawned fetch time to fail.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(reactor.queue_snapshot().await.len(), 1);
        assert!(reactor.detail_for("n1").await.is_none());
    }

    #[tokio::test]
    async fn queue_is_bounded_and_evicts_oldest() {
        let reactor = NotifierReactor::new(None);
        for i in 0..(MAX_QUEUE_LEN + 5) {
            reactor.handle_incoming(notification(&format!("n{}", i))).await;
        }

        let queue = reactor.queue_snapshot().await;
        assert_eq!(queue.len(), MAX_QUEUE_LEN);
        assert_eq!(queue[0].id, "n5", "oldest entries are evicted first");
        assert!(!queue.iter().any(|n| n.id == "n0"));

        // Eviction forgets the sound bookkeeping with the entry, so an
        // evicted id delivered again is treated as new.
        let events = reactor.subscribe();
        let _ = events.drain();
        reactor.handle_incoming(notification("n0")).await;
        let sounded_again = events
            .drain()
            .into_iter()
            .any(|e| matches!(e, NotifierEvent::PlaySound { ref id } if id == "n0"));
        assert!(sounded_again);
    }

    #[tokio::test]
    async fn unread_change_emits_once_per_value() {
        let reactor = NotifierReactor::new(None);
        let events = reactor.subscribe();

        reactor.set_unread(2);
        reactor.set_unread(2);
        reactor.set_unread(5);

        let changes: Vec<u64> = events
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                NotifierEvent::UnreadChanged { count } => Some(count),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![2, 5]);
    }
}
