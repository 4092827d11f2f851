//! Canonical in-memory table of engagement records
//!
//! [`EngagementStore::upsert`] is the only way to change a record. Every
//! accepted write bumps the record's generation and is broadcast as a
//! [`RecordChange`] so observers (UI bindings, tests) can follow along.

use std::collections::HashMap;

use engage_core::{EngagementRecord, EntityId, EntityKind, RecordChange};
use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of the change broadcast channel
pub const DEFAULT_CHANGE_CAPACITY: usize = 1024;

/// In-memory engagement table with a single owner
pub struct EngagementStore {
    /// Records by entity id
    records: HashMap<EntityId, EngagementRecord>,
    /// Change notifications for observers
    changes: broadcast::Sender<RecordChange>,
}

impl Default for EngagementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EngagementStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(DEFAULT_CHANGE_CAPACITY);
        Self::with_sender(changes)
    }

    /// Create an empty store that publishes on an existing channel
    pub fn with_sender(changes: broadcast::Sender<RecordChange>) -> Self {
        Self {
            records: HashMap::new(),
            changes,
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }

    /// Get the current record for an entity
    pub fn get(&self, entity_id: &EntityId) -> Option<&EngagementRecord> {
        self.records.get(entity_id)
    }

    /// Current generation of an entity, 0 if never observed
    pub fn generation(&self, entity_id: &EntityId) -> u64 {
        self.records.get(entity_id).map_or(0, |r| r.generation)
    }

    pub fn contains(&self, entity_id: &EntityId) -> bool {
        self.records.contains_key(entity_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of all stored entities
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.records.keys().cloned().collect()
    }

    /// Apply a local mutator to the current (or a fresh) record and store the result
    ///
    /// The mutator works on a copy. The entity id and generation are owned by
    /// the store: the generation is bumped once per accepted write. A write
    /// that leaves an existing record unchanged is dropped without a
    /// notification.
    pub fn upsert<F>(&mut self, entity_id: &EntityId, kind: EntityKind, mutator: F) -> EngagementRecord
    where
        F: FnOnce(&mut EngagementRecord),
    {
        self.write(entity_id, kind, false, mutator)
    }

    /// Like [`upsert`](Self::upsert), for writes carrying server state
    ///
    /// Also marks the record as baselined at the resulting generation, even
    /// when the write changed nothing.
    pub fn sync<F>(&mut self, entity_id: &EntityId, kind: EntityKind, mutator: F) -> EngagementRecord
    where
        F: FnOnce(&mut EngagementRecord),
    {
        self.write(entity_id, kind, true, mutator)
    }

    fn write<F>(&mut self, entity_id: &EntityId, kind: EntityKind, synced: bool, mutator: F) -> EngagementRecord
    where
        F: FnOnce(&mut EngagementRecord),
    {
        let existing = self.records.get_mut(entity_id);
        let mut next = existing
            .as_deref()
            .cloned()
            .unwrap_or_else(|| EngagementRecord::new(entity_id.clone(), kind));

        let generation = next.generation;
        let synced_generation = next.synced_generation;
        mutator(&mut next);
        next.entity_id = entity_id.clone();
        next.synced_generation = synced_generation;

        if let Some(current) = existing {
            if current.same_state(&next) {
                if synced {
                    current.synced_generation = current.generation;
                }
                return current.clone();
            }
        }

        next.generation = generation + 1;
        if synced {
            next.synced_generation = next.generation;
        }
        trace!(
            entity = %entity_id.short_id(),
            generation = next.generation,
            synced,
            likes = next.like_count,
            comments = next.comment_count,
            "record updated"
        );

        self.records.insert(entity_id.clone(), next.clone());
        // No receivers is fine: nobody is watching yet
        let _ = self.changes.send(RecordChange::Updated {
            entity_id: entity_id.clone(),
            record: next.clone(),
        });
        next
    }

    /// Remove a record, notifying observers if it existed
    pub fn remove(&mut self, entity_id: &EntityId) -> Option<EngagementRecord> {
        let removed = self.records.remove(entity_id)?;
        trace!(entity = %entity_id.short_id(), "record removed");
        let _ = self.changes.send(RecordChange::Removed {
            entity_id: entity_id.clone(),
        });
        Some(removed)
    }
}
