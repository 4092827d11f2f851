//! Collaborator abstractions
//!
//! The synchronizer depends on three external collaborators, each behind a
//! trait so the same reconciliation logic runs against the real backend and
//! against in-memory fakes in tests:
//!
//! - [`EventTransport`]: topic-based push channel
//! - [`SnapshotProvider`]: batch authoritative count reads
//! - [`MutationEndpoint`]: outbound like/unlike requests
//!
//! ## Implementations
//!
//! - [`MockTransport`](crate::MockTransport): in-memory push transport for testing

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{MutationError, SnapshotError, TransportError};
use crate::identity::{EntityId, EntityKind, UserId};
use crate::topic::Topic;

/// A raw frame as delivered by the push transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFrame {
    /// Topic name the frame was published on
    pub topic: String,
    /// Wire event name (e.g. `POST_LIKE`)
    pub event: String,
    /// JSON payload bytes
    pub payload: Vec<u8>,
}

impl TransportFrame {
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    /// Build a frame from a JSON value
    pub fn json(topic: impl Into<String>, event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(topic, event, payload.to_string().into_bytes())
    }
}

/// Topic-based publish/subscribe push channel
///
/// Delivery is at-least-once, unordered across topics, best-effort ordered
/// within a topic, and there is no replay across reconnects.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Open a connection and return the stream of incoming frames
    ///
    /// The stream ending (`recv` returning `None`) means the connection was
    /// lost. Subscriptions do not survive a reconnect.
    async fn connect(&self) -> Result<mpsc::Receiver<TransportFrame>, TransportError>;

    /// Subscribe to a topic on the current connection
    async fn subscribe(&self, topic: &Topic) -> Result<(), TransportError>;

    /// Unsubscribe from a topic
    ///
    /// Default implementation does nothing (the connection drops unknown topics).
    async fn unsubscribe(&self, _topic: &Topic) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Authoritative counts for one entity at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub like_count: u64,
    pub comment_count: u64,
    /// Whether the requesting user likes the entity, if the backend knows
    pub liked_by_me: Option<bool>,
}

/// Batch read of authoritative counts
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Fetch counts for the given entities
    ///
    /// Entities missing from the returned map failed individually and are
    /// left untouched by the caller.
    async fn fetch_snapshot(
        &self,
        entity_ids: &[EntityId],
    ) -> Result<HashMap<EntityId, EntitySnapshot>, SnapshotError>;
}

/// Outbound engagement action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    Like,
    Unlike,
}

impl MutationAction {
    /// Like-count delta this action applies
    pub fn delta(&self) -> i64 {
        match self {
            MutationAction::Like => 1,
            MutationAction::Unlike => -1,
        }
    }

    /// Action that moves membership to `liked`
    pub fn toward(liked: bool) -> Self {
        if liked {
            MutationAction::Like
        } else {
            MutationAction::Unlike
        }
    }
}

/// A single outbound mutation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRequest {
    pub action: MutationAction,
    pub entity_id: EntityId,
    pub entity_kind: EntityKind,
    pub user_id: UserId,
}

/// Endpoint accepting like/unlike requests
#[async_trait]
pub trait MutationEndpoint: Send + Sync {
    /// Send a mutation; `Ok` means the server accepted it
    async fn send_mutation(&self, request: MutationRequest) -> Result<(), MutationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_action_toward() {
        assert_eq!(MutationAction::toward(true), MutationAction::Like);
        assert_eq!(MutationAction::toward(false), MutationAction::Unlike);
        assert_eq!(MutationAction::Unlike.delta(), -1);
    }

    #[test]
    fn test_json_frame() {
        let frame = TransportFrame::json("post-1", "POST-DELETED", serde_json::json!({ "id": "1" }));
        let value: serde_json::Value = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn test_traits_are_object_safe() {
        fn assert_transport(_: &dyn EventTransport) {}
        fn assert_snapshot(_: &dyn SnapshotProvider) {}
        fn assert_endpoint(_: &dyn MutationEndpoint) {}
    }
}
