//! Typed engagement events
//!
//! Every push payload is decoded into an [`EngagementEvent`] exactly once, at
//! the transport boundary (see [`crate::wire`]). Downstream code never sees
//! untyped dictionaries.

use serde::{Deserialize, Serialize};

use crate::identity::{EntityId, EntityKind, UserId};

/// What happened to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Like,
    Unlike,
    CommentAdd,
    CommentRemove,
    EntityDeleted,
}

impl EventKind {
    /// Sign of the implied count change for count-bearing kinds
    pub fn implied_delta(&self) -> i64 {
        match self {
            EventKind::Like | EventKind::CommentAdd => 1,
            EventKind::Unlike | EventKind::CommentRemove => -1,
            EventKind::EntityDeleted => 0,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Like => write!(f, "like"),
            EventKind::Unlike => write!(f, "unlike"),
            EventKind::CommentAdd => write!(f, "comment_add"),
            EventKind::CommentRemove => write!(f, "comment_remove"),
            EventKind::EntityDeleted => write!(f, "entity_deleted"),
        }
    }
}

/// A push event describing an engagement change made by some user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub kind: EventKind,
    /// Entity whose counters changed (the post for comment add/remove)
    pub entity_id: EntityId,
    pub entity_kind: EntityKind,
    /// User who performed the action; `None` for server-side deletions
    pub actor_id: Option<UserId>,
    /// Owner of the entity, when the server includes it
    pub owner_id: Option<UserId>,
    /// Post-mutation absolute count asserted by the server
    pub count: Option<u64>,
    /// Display name of the actor, for notifications
    pub actor_name: Option<String>,
    /// Comment text, for notifications
    pub excerpt: Option<String>,
}

impl EngagementEvent {
    fn base(kind: EventKind, entity_id: EntityId, entity_kind: EntityKind) -> Self {
        Self {
            kind,
            entity_id,
            entity_kind,
            actor_id: None,
            owner_id: None,
            count: None,
            actor_name: None,
            excerpt: None,
        }
    }

    /// Create a like event
    pub fn like(entity_id: EntityId, entity_kind: EntityKind, actor: UserId) -> Self {
        Self::base(EventKind::Like, entity_id, entity_kind).with_actor(actor)
    }

    /// Create an unlike event
    pub fn unlike(entity_id: EntityId, entity_kind: EntityKind, actor: UserId) -> Self {
        Self::base(EventKind::Unlike, entity_id, entity_kind).with_actor(actor)
    }

    /// Create a comment-added event on a post
    pub fn comment_add(post_id: EntityId, actor: UserId) -> Self {
        Self::base(EventKind::CommentAdd, post_id, EntityKind::Post).with_actor(actor)
    }

    /// Create a comment-removed event on a post
    pub fn comment_remove(post_id: EntityId) -> Self {
        Self::base(EventKind::CommentRemove, post_id, EntityKind::Post)
    }

    /// Create an entity-deleted event
    pub fn deleted(entity_id: EntityId, entity_kind: EntityKind) -> Self {
        Self::base(EventKind::EntityDeleted, entity_id, entity_kind)
    }

    pub fn with_actor(mut self, actor: UserId) -> Self {
        self.actor_id = Some(actor);
        self
    }

    pub fn with_owner(mut self, owner: UserId) -> Self {
        self.owner_id = Some(owner);
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_actor_name(mut self, name: impl Into<String>) -> Self {
        self.actor_name = Some(name.into());
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    /// Whether the local user caused this event
    pub fn is_self_origin(&self, local_user: &UserId) -> bool {
        self.actor_id.as_ref() == Some(local_user)
    }
}
