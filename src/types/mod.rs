pub mod error;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reconcile::{merge_field, Merge};

/// Parameters for opening one server-push subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeParams {
    /// Subscription scope, e.g. "livemap" or "notifier".
    pub scope: String,
}

impl SubscribeParams {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }
}

/// An active dispatch job shown on the livemap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: String,
    pub postal: Option<String>,
    pub message: Option<String>,
    pub assigned_units: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Merge for Job {
    fn merge_id(&self) -> Option<&str> {
        if self.id.is_empty() {
            None
        } else {
            Some(&self.id)
        }
    }

    fn merge_from(&mut self, incoming: &Self) -> bool {
        let mut changed = false;
        changed |= merge_field(&mut self.status, &incoming.status);
        changed |= merge_field(&mut self.postal, &incoming.postal);
        changed |= merge_field(&mut self.message, &incoming.message);
        changed |= merge_field(&mut self.assigned_units, &incoming.assigned_units);
        changed |= merge_field(&mut self.created_at, &incoming.created_at);
        changed
    }
}

/// A static or dispatcher-placed marker on the livemap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapMarker {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Merge for MapMarker {
    fn merge_id(&self) -> Option<&str> {
        if self.id.is_empty() {
            None
        } else {
            Some(&self.id)
        }
    }

    fn merge_from(&mut self, incoming: &Self) -> bool {
        let mut changed = false;
        changed |= merge_field(&mut self.name, &incoming.name);
        changed |= merge_field(&mut self.x, &incoming.x);
        changed |= merge_field(&mut self.y, &incoming.y);
        changed |= merge_field(&mut self.color, &incoming.color);
        changed |= merge_field(&mut self.icon, &incoming.icon);
        changed |= merge_field(&mut self.description, &incoming.description);
        changed |= merge_field(&mut self.expires_at, &incoming.expires_at);
        changed
    }
}

/// Position of one on-duty user, delivered in chunked roster snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMarker {
    pub user_id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub unit: Option<String>,
    pub job_grade: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Merge for UserMarker {
    fn merge_id(&self) -> Option<&str> {
        if self.user_id.is_empty() {
            None
        } else {
            Some(&self.user_id)
        }
    }

    fn merge_from(&mut self, incoming: &Self) -> bool {
        let mut changed = false;
        changed |= merge_field(&mut self.name, &incoming.name);
        changed |= merge_field(&mut self.x, &incoming.x);
        changed |= merge_field(&mut self.y, &incoming.y);
        changed |= merge_field(&mut self.unit, &incoming.unit);
        changed |= merge_field(&mut self.job_grade, &incoming.job_grade);
        changed |= merge_field(&mut self.updated_at, &incoming.updated_at);
        changed
    }
}

/// Notification category, used for sound selection on the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationCategory {
    General,
    Dispatch,
    Calendar,
    Mail,
}

impl Default for NotificationCategory {
    fn default() -> Self {
        Self::General
    }
}

/// A single user-facing notification.
///
/// Server-pushed notifications are thin: a referenced calendar entry is
/// fetched on demand by the notifier, never inlined here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    /// Referenced calendar entry, fetched on demand when present.
    pub calendar_entry_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub read: bool,
}

/// Full calendar entry, the richer payload behind a thin notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
}

/// Summary of one mail thread as shown in the thread list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: String,
    pub subject: String,
    pub creator: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub archived: bool,
}

impl Merge for ThreadSummary {
    fn merge_id(&self) -> Option<&str> {
        if self.id.is_empty() {
            None
        } else {
            Some(&self.id)
        }
    }

    fn merge_from(&mut self, incoming: &Self) -> bool {
        let mut changed = false;
        changed |= merge_field(&mut self.subject, &incoming.subject);
        changed |= merge_field(&mut self.creator, &incoming.creator);
        changed |= merge_field(&mut self.last_message_at, &incoming.last_message_at);
        changed |= merge_field(&mut self.archived, &incoming.archived);
        changed
    }
}

/// One mail-thread change pushed over the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadUpdate {
    pub thread: ThreadSummary,
    /// Whether the thread now has messages unread by this user.
    pub unread: bool,
}

/// One decoded inbound stream message.
///
/// The wire codec is an external collaborator; by the time a message
/// reaches this core it has been decoded into one of these variants.
/// Unknown discriminants are preserved so the router can log and drop
/// them (forward compatible with server-side additions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamMessage {
    JobsSnapshot {
        jobs: Vec<Job>,
    },
    MarkerSnapshot {
        markers: Vec<MapMarker>,
    },
    /// Chunked roster snapshot; `part <= 0` marks the terminal chunk.
    UserSnapshot {
        users: Vec<UserMarker>,
        part: i32,
    },
    Notification(Notification),
    MailThreadUpdate(ThreadUpdate),
    /// Separately signaled unread-notification counter.
    UnreadCount {
        count: u64,
    },
    /// Periodic liveness signal; carries no payload.
    Keepalive,
    /// Server asks the client to reconnect (e.g. before a deploy).
    RestartRequested,
    Unknown {
        kind: String,
        payload: serde_json::Value,
    },
}

impl StreamMessage {
    /// Discriminant name, for logging.
    pub fn kind(&self) -> &str {
        match self {
            Self::JobsSnapshot { .. } => "jobsSnapshot",
            Self::MarkerSnapshot { .. } => "markerSnapshot",
            Self::UserSnapshot { .. } => "userSnapshot",
            Self::Notification(_) => "notification",
            Self::MailThreadUpdate(_) => "mailThreadUpdate",
            Self::UnreadCount { .. } => "unreadCount",
            Self::Keepalive => "keepalive",
            Self::RestartRequested => "restartRequested",
            Self::Unknown { kind, .. } => kind,
        }
    }
}
