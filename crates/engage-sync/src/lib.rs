//! # Engage Sync
//!
//! Keeps per-entity engagement state (like and comment counters, the local
//! user's liked/bookmarked flags) consistent across three sources:
//!
//! - batch snapshots from the backend
//! - optimistic local mutations
//! - the push-event stream
//!
//! All state lives in one writer task behind an [`EngagementEngine`] handle.
//! Observers follow along through [`EngagementEngine::changes`],
//! [`EngagementEngine::notifications`] and [`EngagementEngine::connectivity`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use engage_core::{EntityKind, MockTransport, UserId};
//! use engage_sync::{Collaborators, EngagementEngine, EngineConfig, VisibleSet};
//!
//! let collaborators = Collaborators::new(snapshots, mutations)
//!     .with_transport(Arc::new(MockTransport::new()));
//! let engine = EngagementEngine::spawn(EngineConfig::default(), UserId::new("me"), collaborators);
//!
//! engine.set_visible(VisibleSet::feed(["p1", "p2"]))?;
//! let ticket = engine.toggle_like("p1", EntityKind::Post).await?;
//! assert!(ticket.record.liked_by_me);
//! ```

pub mod config;
mod connection;
pub mod engine;
pub mod error;
pub mod notification;
pub mod optimistic;
pub mod reconciler;
pub mod store;
pub mod subscription;

// Re-exports
pub use config::{EngineConfig, EngineConfigBuilder, Preset};
pub use engine::{Collaborators, EngagementEngine, MutationTicket};
pub use error::{RejectReason, SyncError, SyncResult};
pub use notification::{Notification, NotificationDispatcher, NotificationKind};
pub use optimistic::{
    BeginOutcome, EchoMatch, MutationId, MutationOutcome, MutationState, OptimisticMutationTracker,
    PendingMutation, ResponseAction, TimeoutAction,
};
pub use reconciler::{Applied, EventReconciler, Snapshot, SnapshotEntry, SnapshotSummary};
pub use store::EngagementStore;
pub use subscription::{
    Backoff, ConnectionState, ConnectivityState, OpenThread, ResyncPlan, SubscriptionDelta,
    SubscriptionManager, VisibleSet,
};
