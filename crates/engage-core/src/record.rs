//! Per-entity engagement records

use serde::{Deserialize, Serialize};

use crate::identity::{EntityId, EntityKind};

/// Counters and local-user membership flags for one content entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementRecord {
    /// The entity this record describes
    pub entity_id: EntityId,
    /// Post or comment
    pub kind: EntityKind,
    /// Number of likes (reply-likes for a comment)
    pub like_count: u64,
    /// Number of comments (replies for a comment)
    pub comment_count: u64,
    /// Whether the local user likes this entity
    pub liked_by_me: bool,
    /// Whether the local user bookmarked this entity
    pub bookmarked_by_me: bool,
    /// Bumped on every accepted write, never decreases
    pub generation: u64,
    /// Generation of the last write carrying server state; 0 until a baseline arrives
    pub synced_generation: u64,
    /// Net like-count delta applied optimistically and not yet confirmed
    pub pending_self_delta: i64,
}

impl EngagementRecord {
    /// A fresh record as created the first time an entity is observed
    pub fn new(entity_id: EntityId, kind: EntityKind) -> Self {
        Self {
            entity_id,
            kind,
            like_count: 0,
            comment_count: 0,
            liked_by_me: false,
            bookmarked_by_me: false,
            generation: 0,
            synced_generation: 0,
            pending_self_delta: 0,
        }
    }

    /// Apply a signed delta to the like count, clamping at zero
    pub fn apply_like_delta(&mut self, delta: i64) {
        self.like_count = apply_delta(self.like_count, delta);
    }

    /// Apply a signed delta to the comment count, clamping at zero
    pub fn apply_comment_delta(&mut self, delta: i64) {
        self.comment_count = apply_delta(self.comment_count, delta);
    }

    /// Whether an optimistic like mutation is outstanding
    pub fn has_pending(&self) -> bool {
        self.pending_self_delta != 0
    }

    /// Whether server counts have been applied at least once
    pub fn is_baselined(&self) -> bool {
        self.synced_generation > 0
    }

    /// Compare the observable fields, ignoring the generation counters
    pub fn same_state(&self, other: &Self) -> bool {
        self.like_count == other.like_count
            && self.comment_count == other.comment_count
            && self.liked_by_me == other.liked_by_me
            && self.bookmarked_by_me == other.bookmarked_by_me
            && self.pending_self_delta == other.pending_self_delta
            && self.kind == other.kind
    }
}

fn apply_delta(count: u64, delta: i64) -> u64 {
    if delta >= 0 {
        count.saturating_add(delta.unsigned_abs())
    } else {
        count.saturating_sub(delta.unsigned_abs())
    }
}

/// Change notification emitted by the store after every accepted write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    /// The record was created or modified
    Updated {
        entity_id: EntityId,
        record: EngagementRecord,
    },
    /// The record was deleted or evicted
    Removed { entity_id: EntityId },
}

impl RecordChange {
    pub fn entity_id(&self) -> &EntityId {
        match self {
            RecordChange::Updated { entity_id, .. } => entity_id,
            RecordChange::Removed { entity_id } => entity_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_untouched() {
        let record = EngagementRecord::new(EntityId::new("p1"), EntityKind::Post);
        assert_eq!(record.generation, 0);
        assert!(!record.is_baselined());
        assert_eq!(record.like_count, 0);
        assert!(!record.has_pending());
    }

    #[test]
    fn test_deltas_clamp_at_zero() {
        let mut record = EngagementRecord::new(EntityId::new("p1"), EntityKind::Post);
        record.apply_like_delta(-1);
        assert_eq!(record.like_count, 0);

        record.apply_comment_delta(2);
        record.apply_comment_delta(-5);
        assert_eq!(record.comment_count, 0);
    }

    #[test]
    fn test_same_state_ignores_generation() {
        let a = EngagementRecord::new(EntityId::new("p1"), EntityKind::Post);
        let mut b = a.clone();
        b.generation = 7;
        b.synced_generation = 7;
        assert!(a.same_state(&b));

        b.liked_by_me = true;
        assert!(!a.same_state(&b));
    }
}
