//! Mail-thread reactor
//!
//! Owns the thread summary collection and the set of unread thread ids.
//! Thread updates arrive one at a time over the stream; each one upserts
//! the summary and folds the unread flag into the unread-id set.

use std::collections::HashSet;

use flume::{Receiver, Sender};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::reconcile::{Delta, ReconciliationSet};
use crate::types::{ThreadSummary, ThreadUpdate};

#[derive(Debug, Clone, Serialize)]
pub enum MailerEvent {
    ThreadsChanged(Delta),
    UnreadChanged { count: usize },
}

pub struct MailerReactor {
    threads: RwLock<ReconciliationSet<ThreadSummary>>,
    unread_ids: RwLock<HashSet<String>>,
    events_tx: Sender<MailerEvent>,
    events_rx: Receiver<MailerEvent>,
}

impl MailerReactor {
    pub fn new() -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            threads: RwLock::new(ReconciliationSet::new()),
            unread_ids: RwLock::new(HashSet::new()),
            events_tx,
            events_rx,
        }
    }

    pub fn subscribe(&self) -> Receiver<MailerEvent> {
        self.events_rx.clone()
    }

    pub async fn apply_update(&self, update: ThreadUpdate) {
        let thread_id = update.thread.id.clone();
        let delta = self.threads.write().await.upsert(update.thread);
        if !delta.is_empty() {
            debug!("thread {} upserted", thread_id);
            self.emit(MailerEvent::ThreadsChanged(delta));
        }

        let mut unread = self.unread_ids.write().await;
        let changed = if update.unread {
            unread.insert(thread_id)
        } else {
            unread.remove(&thread_id)
        };
        if changed {
            let count = unread.len();
            drop(unread);
            self.emit(MailerEvent::UnreadChanged { count });
        }
    }

    /// A user opened a thread locally; drop it from the unread set
    /// without waiting for the server to confirm.
    pub async fn mark_read(&self, thread_id: &str) {
        let mut unread = self.unread_ids.write().await;
        if unread.remove(thread_id) {
            let count = unread.len();
            drop(unread);
            self.emit(MailerEvent::UnreadChanged { count });
        }
    }

    pub async fn threads_snapshot(&self) -> Vec<ThreadSummary> {
        self.threads.read().await.snapshot()
    }

    pub async fn unread_ids(&self) -> HashSet<String> {
        self.unread_ids.read().await.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.unread_ids.read().await.len()
    }

    fn emit(&self, event: MailerEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl Default for MailerReactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(id: &str, subject: &str, unread: bool) -> ThreadUpdate {
        ThreadUpdate {
            thread: ThreadSummary {
                id: id.to_string(),
                subject: subject.to_string(),
                ..Default::default()
            },
            unread,
        }
    }

    #[tokio::test]
    async fn updates_upsert_threads_and_track_unread() {
        let reactor = MailerReactor::new();

        reactor.apply_update(update("t1", "patrol roster", true)).await;
        reactor.apply_update(update("t2", "equipment", false)).await;
        assert_eq!(reactor.threads_snapshot().await.len(), 2);
        assert_eq!(reactor.unread_count().await, 1);
        assert!(reactor.unread_ids().await.contains("t1"));

        // Re-delivery with the unread flag cleared.
        reactor.apply_update(update("t1", "patrol roster", false)).await;
        assert_eq!(reactor.threads_snapshot().await.len(), 2);
        assert_eq!(reactor.unread_count().await, 0);
    }

    #[tokio::test]
    async fn subject_edit_updates_in_place() {
        let reactor = MailerReactor::new();
        reactor.apply_update(update("t1", "old subject", false)).await;
        reactor.apply_update(update("t1", "new subject", false)).await;

        let threads = reactor.threads_snapshot().await;
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].subject, "new subject");
    }

    #[tokio::test]
    async fn mark_read_is_local_and_idempotent() {
        let reactor = MailerReactor::new();
        reactor.apply_update(update("t1", "a", true)).await;

        reactor.mark_read("t1").await;
        reactor.mark_read("t1").await;
        assert_eq!(reactor.unread_count().await, 0);
    }
}
