//! Livemap reactor
//!
//! Owns the marker, job and user-roster collections shown on the map.
//! Marker and job snapshots are authoritative (full replace); the user
//! roster is large and arrives chunked under connection limits, so stale
//! entries are only compacted on the terminal chunk.

use flume::{Receiver, Sender};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::reconcile::{Delta, ReconciliationSet};
use crate::types::{Job, MapMarker, UserMarker};

/// Change notifications for the map view.
#[derive(Debug, Clone, Serialize)]
pub enum LivemapEvent {
    JobsChanged(Delta),
    MarkersChanged(Delta),
    UsersChanged(Delta),
    /// The marker the operator was inspecting disappeared in a removal pass.
    SelectionCleared { id: String },
}

pub struct LivemapReactor {
    jobs: RwLock<ReconciliationSet<Job>>,
    markers: RwLock<ReconciliationSet<MapMarker>>,
    users: RwLock<ReconciliationSet<UserMarker>>,
    /// Part index of the previous roster chunk; `None` between sequences.
    last_roster_part: RwLock<Option<i32>>,
    /// Id of the marker the operator is currently inspecting, if any.
    selected: RwLock<Option<String>>,
    events_tx: Sender<LivemapEvent>,
    events_rx: Receiver<LivemapEvent>,
}

impl LivemapReactor {
    pub fn new() -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            jobs: RwLock::new(ReconciliationSet::new()),
            markers: RwLock::new(ReconciliationSet::new()),
            users: RwLock::new(ReconciliationSet::new()),
            last_roster_part: RwLock::new(None),
            selected: RwLock::new(None),
            events_tx,
            events_rx,
        }
    }

    /// Channel of map change notifications for the presentation layer.
    pub fn subscribe(&self) -> Receiver<LivemapEvent> {
        self.events_rx.clone()
    }

    pub async fn apply_jobs(&self, jobs: Vec<Job>) {
        let delta = self.jobs.write().await.apply_full(jobs);
        if !delta.is_empty() {
            debug!(
                added = delta.added.len(),
                updated = delta.updated.len(),
                removed = delta.removed.len(),
                "job snapshot reconciled"
            );
            self.emit(LivemapEvent::JobsChanged(delta));
        }
    }

    pub async fn apply_markers(&self, markers: Vec<MapMarker>) {
        let delta = self.markers.write().await.apply_full(markers);
        self.clear_selection_if_removed(&delta).await;
        if !delta.is_empty() {
            debug!(
                added = delta.added.len(),
                updated = delta.updated.len(),
                removed = delta.removed.len(),
                "marker snapshot reconciled"
            );
            self.emit(LivemapEvent::MarkersChanged(delta));
        }
    }

    /// Apply one part of a chunked roster snapshot. The wire convention
    /// counts parts down, marking the terminal chunk with `part <= 0`.
    pub async fn apply_users(&self, users: Vec<UserMarker>, part: i32) {
        let terminal = part <= 0;
        let delta = {
            let mut roster = self.users.write().await;
            let mut last_part = self.last_roster_part.write().await;
            // A part index that did not decrease means the previous
            // sequence was cut short (the stream reconnected) and the
            // server started over. Its partial accumulation must not be
            // credited toward this sequence's removal pass.
            if matches!(*last_part, Some(previous) if part >= previous) {
                debug!(part, "roster sequence restarted, discarding partial accumulation");
                roster.reset_pending();
            }
            *last_part = if terminal { None } else { Some(part) };
            roster.apply_chunk(users, terminal)
        };
        if !delta.is_empty() {
            debug!(
                part,
                terminal,
                added = delta.added.len(),
                updated = delta.updated.len(),
                removed = delta.removed.len(),
                "user roster chunk reconciled"
            );
            self.emit(LivemapEvent::UsersChanged(delta));
        }
    }

    /// Mark a marker as the one the operator is inspecting.
    pub async fn select_marker(&self, id: impl Into<String>) {
        let id = id.into();
        info!("marker selected: {}", id);
        *self.selected.write().await = Some(id);
    }

    pub async fn clear_selection(&self) {
        *self.selected.write().await = None;
    }

    pub async fn selected_marker_id(&self) -> Option<String> {
        self.selected.read().await.clone()
    }

    /// Current state of the selected marker. Merges mutate marker fields
    /// in place, so this always reflects the latest snapshot.
    pub async fn selected_marker(&self) -> Option<MapMarker> {
        let selected = self.selected.read().await.clone()?;
        self.markers.read().await.get(&selected).cloned()
    }

    pub async fn jobs_snapshot(&self) -> Vec<Job> {
        self.jobs.read().await.snapshot()
    }

    pub async fn markers_snapshot(&self) -> Vec<MapMarker> {
        self.markers.read().await.snapshot()
    }

    pub async fn users_snapshot(&self) -> Vec<UserMarker> {
        self.users.read().await.snapshot()
    }

    pub async fn marker(&self, id: &str) -> Option<MapMarker> {
        self.markers.read().await.get(id).cloned()
    }

    async fn clear_selection_if_removed(&self, delta: &Delta) {
        if delta.removed.is_empty() {
            return;
        }
        let mut selected = self.selected.write().await;
        if let Some(id) = selected.as_ref() {
            if delta.removed.iter().any(|removed| removed == id) {
                info!("selected marker {} removed, clearing selection", id);
                let cleared = id.clone();
                *selected = None;
                self.emit(LivemapEvent::SelectionCleared { id: cleared });
            }
        }
    }

    fn emit(&self, event: LivemapEvent) {
        // Receiver is never dropped while the reactor lives, but a UI-less
        // consumer may have taken and dropped a clone.
        let _ = self.events_tx.send(event);
    }
}

impl Default for LivemapReactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: &str, x: f64, y: f64) -> MapMarker {
        MapMarker {
            id: id.to_string(),
            name: format!("marker {}", id),
            x,
            y,
            ..Default::default()
        }
    }

    fn user(id: &str, x: f64) -> UserMarker {
        UserMarker {
            user_id: id.to_string(),
            name: format!("user {}", id),
            x,
            y: 0.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn marker_snapshot_is_authoritative() {
        let reactor = LivemapReactor::new();
        reactor
            .apply_markers(vec![marker("1", 0.0, 0.0), marker("2", 0.0, 0.0), marker("3", 0.0, 0.0)])
            .await;
        reactor
            .apply_markers(vec![marker("2", 0.0, 0.0), marker("3", 0.0, 0.0), marker("4", 0.0, 0.0)])
            .await;

        let mut ids: Vec<String> = reactor
            .markers_snapshot()
            .await
            .into_iter()
            .map(|m| m.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["2", "3", "4"]);
    }

    #[tokio::test]
    async fn roster_chunks_compact_only_on_terminal_part() {
        let reactor = LivemapReactor::new();
        reactor.apply_users(vec![user("A", 0.0), user("Z", 0.0)], 0).await;

        // Two-part sequence: part 1 is additive, part 0 is terminal.
        reactor.apply_users(vec![user("A", 1.0), user("B", 0.0)], 1).await;
        assert_eq!(reactor.users_snapshot().await.len(), 3, "Z survives part 1");

        reactor.apply_users(vec![user("C", 0.0)], 0).await;
        let mut ids: Vec<String> = reactor
            .users_snapshot()
            .await
            .into_iter()
            .map(|u| u.user_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["A", "B", "C"], "Z removed only at terminal part");
    }

    #[tokio::test]
    async fn aborted_roster_sequence_does_not_shield_stale_users() {
        let reactor = LivemapReactor::new();
        // Part 1 of a sequence whose terminal part is lost to a disconnect.
        reactor.apply_users(vec![user("A", 0.0)], 1).await;

        // After the reconnect the server restarts the sequence from
        // scratch. A is not in it and must be compacted away.
        reactor.apply_users(vec![user("B", 0.0)], 1).await;
        reactor.apply_users(vec![user("C", 0.0)], 0).await;

        let mut ids: Vec<String> = reactor
            .users_snapshot()
            .await
            .into_iter()
            .map(|u| u.user_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["B", "C"], "A belonged only to the dead sequence");
    }

    #[tokio::test]
    async fn selection_survives_merge_and_observes_updates() {
        let reactor = LivemapReactor::new();
        reactor.apply_markers(vec![marker("1", 10.0, 20.0)]).await;
        reactor.select_marker("1").await;

        reactor.apply_markers(vec![marker("1", 11.0, 21.0)]).await;

        let selected = reactor.selected_marker().await.unwrap();
        assert_eq!(selected.x, 11.0);
        assert_eq!(selected.y, 21.0);
    }

    #[tokio::test]
    async fn selection_cleared_when_marker_removed() {
        let reactor = LivemapReactor::new();
        let events = reactor.subscribe();
        reactor.apply_markers(vec![marker("1", 0.0, 0.0), marker("2", 0.0, 0.0)]).await;
        reactor.select_marker("1").await;

        reactor.apply_markers(vec![marker("2", 0.0, 0.0)]).await;

        assert_eq!(reactor.selected_marker_id().await, None);
        let cleared = events
            .drain()
            .into_iter()
            .any(|e| matches!(e, LivemapEvent::SelectionCleared { ref id } if id == "1"));
        assert!(cleared, "SelectionCleared event expected");
    }

    #[tokio::test]
    async fn unchanged_snapshot_emits_no_event() {
        let reactor = LivemapReactor::new();
        reactor.apply_markers(vec![marker("1", 0.0, 0.0)]).await;

        let events = reactor.subscribe();
        let _ = events.drain();
        reactor.apply_markers(vec![marker("1", 0.0, 0.0)]).await;

        assert!(events.is_empty(), "identical snapshot must not notify");
    }
}
