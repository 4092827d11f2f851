//! User-facing notifications derived from push events
//!
//! Only events where someone else engaged with content owned by the local
//! user produce a notification. The dispatcher never reads or writes the
//! store.

use engage_core::{EngagementEvent, EntityId, EntityKind, EventKind, UserId};
use serde::{Deserialize, Serialize};

/// Fallback when the event carries no display name
const UNKNOWN_ACTOR: &str = "Someone";

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PostLiked,
    PostCommented,
    CommentLiked,
}

/// A notification ready to be shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Entity the notification points at
    pub entity_id: EntityId,
}

/// Derives notifications for one local user
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    local_user: UserId,
}

impl NotificationDispatcher {
    pub fn new(local_user: UserId) -> Self {
        Self { local_user }
    }

    /// Build the notification for an event, if it warrants one
    pub fn dispatch(&self, event: &EngagementEvent) -> Option<Notification> {
        let actor = event.actor_id.as_ref()?;
        if actor == &self.local_user || event.owner_id.as_ref() != Some(&self.local_user) {
            return None;
        }

        let name = event
            .actor_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_ACTOR);

        let (kind, title, body) = match (event.kind, event.entity_kind) {
            (EventKind::Like, EntityKind::Post) => (
                NotificationKind::PostLiked,
                format!("{name} liked your post!"),
                "Your content is getting engagement!".to_string(),
            ),
            (EventKind::CommentAdd, _) => (
                NotificationKind::PostCommented,
                format!("{name} commented on your post"),
                match event.excerpt.as_deref().map(str::trim) {
                    Some(excerpt) if !excerpt.is_empty() => format!("\"{excerpt}...\""),
                    _ => "Check out their comment".to_string(),
                },
            ),
            (EventKind::Like, EntityKind::Comment) => (
                NotificationKind::CommentLiked,
                format!("{name} liked your comment!"),
                "Your comment resonated with someone!".to_string(),
            ),
            _ => return None,
        };

        Some(Notification {
            kind,
            title,
            body,
            entity_id: event.entity_id.clone(),
        })
    }
}
