//! Push-transport topics

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::identity::{EntityId, UserId};

/// A subscription topic on the push transport
///
/// Topic names are stable strings: `post-<id>`, `thread-<post id>` and
/// `user-<id>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Likes, comment counts and deletion of one feed post
    Post(EntityId),
    /// Comment likes and comment deletions inside an open thread
    Thread(EntityId),
    /// Personal topic of the local user
    User(UserId),
}

impl Topic {
    const POST_PREFIX: &'static str = "post-";
    const THREAD_PREFIX: &'static str = "thread-";
    const USER_PREFIX: &'static str = "user-";

    /// Wire name of this topic
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Parse a wire topic name
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(id) = name.strip_prefix(Self::POST_PREFIX) {
            (!id.is_empty()).then(|| Topic::Post(EntityId::new(id)))
        } else if let Some(id) = name.strip_prefix(Self::THREAD_PREFIX) {
            (!id.is_empty()).then(|| Topic::Thread(EntityId::new(id)))
        } else if let Some(id) = name.strip_prefix(Self::USER_PREFIX) {
            (!id.is_empty()).then(|| Topic::User(UserId::new(id)))
        } else {
            None
        }
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Post(id) => write!(f, "{}{}", Self::POST_PREFIX, id),
            Topic::Thread(id) => write!(f, "{}{}", Self::THREAD_PREFIX, id),
            Topic::User(id) => write!(f, "{}{}", Self::USER_PREFIX, id),
        }
    }
}
