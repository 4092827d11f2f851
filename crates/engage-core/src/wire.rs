//! Decoding of push frames into typed events
//!
//! The push service publishes loosely-shaped JSON objects whose keys differ
//! per event name (and sometimes between server versions). This module is the
//! only place that knows those shapes.
//!
//! | Wire event        | Kind             | Entity  |
//! |-------------------|------------------|---------|
//! | `POST_LIKE`       | `Like`           | post    |
//! | `POST_UNLIKE`     | `Unlike`         | post    |
//! | `NEW-COMMENT1`    | `CommentAdd`     | post    |
//! | `COMMENT-DELETED` | `CommentRemove`  | post    |
//! | `COMMENT_LIKE`    | `Like`           | comment |
//! | `COMMENT-UNLIKE`  | `Unlike`         | comment |
//! | `POST-DELETED`    | `EntityDeleted`  | post    |
//! | `COMMENT-REMOVED` | `EntityDeleted`  | comment |

use serde::Deserialize;

use crate::error::DecodeError;
use crate::event::EngagementEvent;
use crate::identity::{EntityId, EntityKind, UserId};
use crate::transport::TransportFrame;

pub const POST_LIKE: &str = "POST_LIKE";
pub const POST_UNLIKE: &str = "POST_UNLIKE";
pub const NEW_COMMENT: &str = "NEW-COMMENT1";
pub const COMMENT_DELETED: &str = "COMMENT-DELETED";
pub const COMMENT_LIKE: &str = "COMMENT_LIKE";
pub const COMMENT_UNLIKE: &str = "COMMENT-UNLIKE";
pub const POST_DELETED: &str = "POST-DELETED";
pub const COMMENT_REMOVED: &str = "COMMENT-REMOVED";

/// Maximum characters of comment text kept for notifications
pub const EXCERPT_CHARS: usize = 50;

#[derive(Debug, Default, Deserialize)]
struct RawLike {
    post_id: Option<String>,
    user_id: Option<String>,
    owner: Option<String>,
    username: Option<String>,
}

/// Union of every key the push service is known to send
#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    like: Option<RawLike>,
    id: Option<String>,
    post_id: Option<String>,
    user_id: Option<String>,
    owner: Option<String>,
    username: Option<String>,
    user_name: Option<String>,
    content: Option<String>,
    count: Option<u64>,
    #[serde(rename = "PostID")]
    legacy_post_id: Option<String>,
    #[serde(rename = "UserID")]
    legacy_user_id: Option<String>,
    #[serde(rename = "ID")]
    legacy_id: Option<String>,
    #[serde(rename = "replyId")]
    reply_id: Option<String>,
    #[serde(rename = "User")]
    legacy_user: Option<String>,
}

/// Whether the wire event name is one the synchronizer consumes
pub fn is_engagement_event(event: &str) -> bool {
    matches!(
        event,
        POST_LIKE
            | POST_UNLIKE
            | NEW_COMMENT
            | COMMENT_DELETED
            | COMMENT_LIKE
            | COMMENT_UNLIKE
            | POST_DELETED
            | COMMENT_REMOVED
    )
}

/// Decode a raw frame
///
/// Returns `Ok(None)` for event names that belong to other subsystems (chat,
/// presence, ...). Known names with an unusable payload return a
/// [`DecodeError`].
pub fn decode_frame(frame: &TransportFrame) -> Result<Option<EngagementEvent>, DecodeError> {
    if !is_engagement_event(&frame.event) {
        return Ok(None);
    }
    decode(&frame.event, &frame.payload).map(Some)
}

/// Decode a payload for a known wire event name
pub fn decode(event: &str, payload: &[u8]) -> Result<EngagementEvent, DecodeError> {
    let raw: RawPayload = serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed {
        event: event.to_string(),
        reason: e.to_string(),
    })?;

    let decoded = match event {
        POST_LIKE => {
            let like = raw.like.ok_or_else(|| missing(event, "like"))?;
            let count = raw.count.ok_or_else(|| missing(event, "count"))?;
            let mut decoded = EngagementEvent::like(
                entity(event, like.post_id, "like.post_id")?,
                EntityKind::Post,
                user(event, like.user_id, "like.user_id")?,
            )
            .with_count(count);
            decoded.owner_id = non_empty(like.owner).map(UserId::new);
            decoded.actor_name = non_empty(like.username);
            decoded
        }
        POST_UNLIKE => {
            let like = raw.like.unwrap_or_default();
            let mut decoded = EngagementEvent::unlike(
                entity(event, like.post_id.or(raw.legacy_post_id), "like.post_id")?,
                EntityKind::Post,
                user(event, like.user_id.or(raw.legacy_user_id), "like.user_id")?,
            );
            decoded.count = raw.count;
            decoded
        }
        NEW_COMMENT => {
            let mut decoded = EngagementEvent::comment_add(
                entity(event, raw.post_id, "post_id")?,
                user(event, raw.user_id, "user_id")?,
            );
            decoded.count = raw.count;
            decoded.owner_id = non_empty(raw.owner).map(UserId::new);
            decoded.actor_name = non_empty(raw.user_name.or(raw.username));
            decoded.excerpt = raw
                .content
                .map(|text| text.chars().take(EXCERPT_CHARS).collect::<String>())
                .filter(|text| !text.is_empty());
            decoded
        }
        COMMENT_DELETED => {
            let mut decoded = EngagementEvent::comment_remove(entity(event, raw.post_id, "post_id")?);
            decoded.actor_id = non_empty(raw.user_id).map(UserId::new);
            decoded.count = raw.count;
            decoded
        }
        COMMENT_LIKE => {
            // The service reuses `post_id` for the comment id here
            let mut decoded = EngagementEvent::like(
                entity(event, raw.post_id, "post_id")?,
                EntityKind::Comment,
                user(event, raw.user_id, "user_id")?,
            );
            decoded.count = raw.count;
            decoded.owner_id = non_empty(raw.owner).map(UserId::new);
            decoded.actor_name = non_empty(raw.username);
            decoded
        }
        COMMENT_UNLIKE => {
            let mut decoded = EngagementEvent::unlike(
                entity(event, raw.legacy_id.or(raw.reply_id), "ID")?,
                EntityKind::Comment,
                user(event, raw.legacy_user.or(raw.user_id), "User")?,
            );
            decoded.count = raw.count;
            decoded
        }
        POST_DELETED => EngagementEvent::deleted(entity(event, raw.id, "id")?, EntityKind::Post),
        COMMENT_REMOVED => {
            EngagementEvent::deleted(entity(event, raw.id, "id")?, EntityKind::Comment)
        }
        other => {
            return Err(DecodeError::Malformed {
                event: other.to_string(),
                reason: "unknown event name".to_string(),
            });
        }
    };

    Ok(decoded)
}

fn missing(event: &str, field: &'static str) -> DecodeError {
    DecodeError::MissingField {
        event: event.to_string(),
        field,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn entity(event: &str, value: Option<String>, field: &'static str) -> Result<EntityId, DecodeError> {
    non_empty(value)
        .map(EntityId::new)
        .ok_or_else(|| missing(event, field))
}

fn user(event: &str, value: Option<String>, field: &'static str) -> Result<UserId, DecodeError> {
    non_empty(value)
        .map(UserId::new)
        .ok_or_else(|| missing(event, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use serde_json::json;

    fn frame(event: &str, payload: serde_json::Value) -> TransportFrame {
        TransportFrame::json("post-p1", event, payload)
    }

    #[test]
    fn test_decode_post_like() {
        let f = frame(
            POST_LIKE,
            json!({
                "like": { "post_id": "p1", "user_id": "u2", "owner": "u1", "username": "ada" },
                "count": 5
            }),
        );
        let event = decode_frame(&f).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::Like);
        assert_eq!(event.entity_id, EntityId::new("p1"));
        assert_eq!(event.entity_kind, EntityKind::Post);
        assert_eq!(event.actor_id, Some(UserId::new("u2")));
        assert_eq!(event.owner_id, Some(UserId::new("u1")));
        assert_eq!(event.count, Some(5));
        assert_eq!(event.actor_name.as_deref(), Some("ada"));
    }

    #[test]
    fn test_post_like_requires_count() {
        let f = frame(POST_LIKE, json!({ "like": { "post_id": "p1", "user_id": "u2" } }));
        let err = decode_frame(&f).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "count", .. }));
    }

    #[test]
    fn test_decode_post_unlike_legacy_keys() {
        let f = frame(POST_UNLIKE, json!({ "PostID": "p1", "UserID": "u2" }));
        let event = decode_frame(&f).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::Unlike);
        assert_eq!(event.entity_id, EntityId::new("p1"));
        assert_eq!(event.count, None);
    }

    #[test]
    fn test_decode_new_comment_truncates_excerpt() {
        let long = "x".repeat(120);
        let f = frame(
            NEW_COMMENT,
            json!({ "post_id": "p1", "user_id": "u2", "user_name": "bo", "content": long }),
        );
        let event = decode_frame(&f).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::CommentAdd);
        assert_eq!(event.excerpt.unwrap().chars().count(), EXCERPT_CHARS);
        assert_eq!(event.actor_name.as_deref(), Some("bo"));
    }

    #[test]
    fn test_decode_comment_unlike_aliases() {
        let f = frame(COMMENT_UNLIKE, json!({ "replyId": "c7", "user_id": "u3" }));
        let event = decode_frame(&f).unwrap().unwrap();
        assert_eq!(event.entity_kind, EntityKind::Comment);
        assert_eq!(event.entity_id, EntityId::new("c7"));
        assert_eq!(event.actor_id, Some(UserId::new("u3")));
    }

    #[test]
    fn test_decode_deleted() {
        let f = frame(POST_DELETED, json!({ "id": "p1" }));
        let event = decode_frame(&f).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::EntityDeleted);
        assert!(event.actor_id.is_none());
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let f = frame("new-message", json!({ "text": "hi" }));
        assert!(decode_frame(&f).unwrap().is_none());
    }

    #[test]
    fn test_malformed_payloads() {
        let not_json = TransportFrame::new("post-p1", POST_DELETED, b"{oops".to_vec());
        assert!(matches!(
            decode_frame(&not_json),
            Err(DecodeError::Malformed { .. })
        ));

        let wrong_type = frame(POST_LIKE, json!({ "like": { "post_id": "p1", "user_id": "u" }, "count": -3 }));
        assert!(decode_frame(&wrong_type).is_err());

        let empty_id = frame(POST_DELETED, json!({ "id": "" }));
        assert!(matches!(
            decode_frame(&empty_id),
            Err(DecodeError::MissingField { field: "id", .. })
        ));
    }
}
