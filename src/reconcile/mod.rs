//! Snapshot reconciliation
//!
//! Converts one inbound entity batch into the minimum set of mutations on
//! a locally held collection, reporting added/updated/removed ids.
//!
//! Two update modes:
//! - full replace: the incoming batch is authoritative, anything absent
//!   from it is removed;
//! - chunked accumulation: large collections arrive split across ordered
//!   parts, and only the terminal part triggers removal of stale entries
//!   (a partial delivery must never be treated as a smaller authoritative
//!   set).
//!
//! Merges are field-by-field: unchanged attributes are left untouched so
//! identity-sensitive observers are not notified spuriously, and
//! re-applying an identical batch reports zero updates.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

/// Assign `incoming` into `current` only when they differ. Returns
/// whether an assignment happened.
pub fn merge_field<T: PartialEq + Clone>(current: &mut T, incoming: &T) -> bool {
    if current == incoming {
        false
    } else {
        *current = incoming.clone();
        true
    }
}

/// Entity that can live in a [`ReconciliationSet`].
pub trait Merge {
    /// Stable identity, or `None` when the entity is missing its required
    /// identity fields (such entities are dropped and logged, they never
    /// abort the batch).
    fn merge_id(&self) -> Option<&str>;

    /// Merge `incoming` into `self` attribute by attribute, assigning
    /// only attributes that differ. Returns whether anything changed.
    fn merge_from(&mut self, incoming: &Self) -> bool;
}

/// Id lists describing what one batch application changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Delta {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// A live collection keyed by stable entity id.
///
/// Entities are merged in place; the stored value is never wholesale
/// replaced, so anything holding a reference through an accessor between
/// mutations observes field updates rather than a new object.
#[derive(Debug)]
pub struct ReconciliationSet<T> {
    entries: HashMap<String, T>,
    /// Ids seen across the parts of the current chunked sequence.
    pending_seen: HashSet<String>,
}

impl<T> Default for ReconciliationSet<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            pending_seen: HashSet::new(),
        }
    }
}

impl<T: Merge> ReconciliationSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    /// Clone out the current contents for the presentation layer.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.entries.values().cloned().collect()
    }

    /// Insert-or-merge one entity outside any snapshot sequence.
    pub fn upsert(&mut self, entity: T) -> Delta {
        let mut delta = Delta::default();
        self.upsert_one(entity, &mut delta);
        delta
    }

    /// Apply an authoritative batch: insert-or-merge every incoming
    /// entity, then remove every resident id absent from the batch.
    pub fn apply_full(&mut self, incoming: Vec<T>) -> Delta {
        let mut delta = Delta::default();
        let mut batch_ids = HashSet::with_capacity(incoming.len());

        for entity in incoming {
            if let Some(id) = self.upsert_one(entity, &mut delta) {
                batch_ids.insert(id);
            }
        }

        let stale: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !batch_ids.contains(*id))
            .cloned()
            .collect();
        for id in stale {
            self.entries.remove(&id);
            delta.removed.push(id);
        }

        delta
    }

    /// Apply one part of a chunked snapshot. Non-terminal parts are
    /// strictly additive/updating; the terminal part removes every
    /// resident id not seen across the accumulated sequence, then clears
    /// the accumulator.
    pub fn apply_chunk(&mut self, incoming: Vec<T>, terminal: bool) -> Delta {
        let mut delta = Delta::default();

        for entity in incoming {
            if let Some(id) = self.upsert_one(entity, &mut delta) {
                self.pending_seen.insert(id);
            }
        }

        if terminal {
            let stale: Vec<String> = self
                .entries
                .keys()
                .filter(|id| !self.pending_seen.contains(*id))
                .cloned()
                .collect();
            for id in stale {
                self.entries.remove(&id);
                delta.removed.push(id);
            }
            self.pending_seen.clear();
        }

        delta
    }

    /// Discard the ids accumulated by an in-flight chunked sequence.
    ///
    /// For a sequence that died before its terminal part, the ids it
    /// delivered must not be credited toward the next sequence's removal
    /// pass, or entities the server no longer reports would survive it.
    pub fn reset_pending(&mut self) {
        self.pending_seen.clear();
    }

    /// Remove one entity by id, reporting it in the returned delta.
    pub fn remove(&mut self, id: &str) -> Delta {
        let mut delta = Delta::default();
        if self.entries.remove(id).is_some() {
            delta.removed.push(id.to_string());
        }
        delta
    }

    fn upsert_one(&mut self, entity: T, delta: &mut Delta) -> Option<String> {
        let id = match entity.merge_id() {
            Some(id) => id.to_string(),
            None => {
                warn!("dropping entity without identity fields");
                return None;
            }
        };

        match self.entries.get_mut(&id) {
            Some(existing) => {
                if existing.merge_from(&entity) {
                    delta.updated.push(id.clone());
                }
            }
            None => {
                self.entries.insert(id.clone(), entity);
                delta.added.push(id.clone());
            }
        }

        Some(id)
    }
}
