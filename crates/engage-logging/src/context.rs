//! Local-user context for log entries
//!
//! A synchronizer instance runs on behalf of one user. The thread-local
//! context set by [`UserContextGuard`] is picked up by
//! [`UserContextLayer`](crate::layers::UserContextLayer) so spans opened in
//! scope carry the user id and a session id.

use std::cell::RefCell;

use engage_core::UserId;
use uuid::Uuid;

/// Context attached to spans for one user session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
    /// Unique per guard unless given explicitly
    pub session_id: Uuid,
}

thread_local! {
    static USER_CONTEXT: RefCell<Option<UserContext>> = const { RefCell::new(None) };
}

/// RAII guard setting the user context for the current thread
///
/// Dropping the guard restores whatever context was active before.
pub struct UserContextGuard {
    previous: Option<UserContext>,
}

impl UserContextGuard {
    /// Start a new session for a user
    pub fn new(user: &UserId) -> Self {
        Self::with_session_id(user, Uuid::new_v4())
    }

    /// Use a known session id
    pub fn with_session_id(user: &UserId, session_id: Uuid) -> Self {
        let context = UserContext {
            user_id: user.to_string(),
            session_id,
        };
        let previous = USER_CONTEXT.with(|slot| slot.replace(Some(context)));
        Self { previous }
    }

    pub fn current() -> Option<UserContext> {
        USER_CONTEXT.with(|slot| slot.borrow().clone())
    }

    pub fn current_user_id() -> Option<String> {
        Self::current().map(|ctx| ctx.user_id)
    }

    pub fn current_session_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.session_id)
    }
}

impl Drop for UserContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        USER_CONTEXT.with(|slot| *slot.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_sets_and_clears() {
        assert!(UserContextGuard::current().is_none());
        {
            let _guard = UserContextGuard::new(&UserId::new("me"));
            assert_eq!(UserContextGuard::current_user_id().as_deref(), Some("me"));
        }
        assert!(UserContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_guards_restore() {
        let outer_session = Uuid::new_v4();
        let _outer = UserContextGuard::with_session_id(&UserId::new("a"), outer_session);
        {
            let _inner = UserContextGuard::new(&UserId::new("b"));
            assert_eq!(UserContextGuard::current_user_id().as_deref(), Some("b"));
            assert_ne!(UserContextGuard::current_session_id(), Some(outer_session));
        }
        assert_eq!(UserContextGuard::current_session_id(), Some(outer_session));
    }
}
