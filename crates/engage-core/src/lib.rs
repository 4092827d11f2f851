//! # Engage Core
//!
//! Core types, errors, and collaborator traits for the engagement-state
//! synchronizer.
//!
//! The synchronizer keeps like/comment counters and the local user's
//! liked/bookmarked flags consistent across batch snapshots, optimistic local
//! mutations, and a push-event stream. This crate holds everything that is
//! shared between the synchronizer and its collaborators:
//!
//! ## Key Traits
//!
//! - [`EventTransport`]: Topic-based push channel (Pusher-style)
//! - [`SnapshotProvider`]: Batch authoritative count reads
//! - [`MutationEndpoint`]: Outbound like/unlike requests
//!
//! ## Key Types
//!
//! - [`EngagementRecord`]: Per-entity counters and membership flags
//! - [`EngagementEvent`]: Typed push event, decoded once by [`wire::decode_frame`]
//! - [`Topic`]: Subscription topic derived from the visible content set

pub mod error;
pub mod event;
pub mod identity;
pub mod mock_transport;
pub mod record;
pub mod topic;
pub mod transport;
pub mod wire;

// Re-export main types
pub use error::*;
pub use event::*;
pub use identity::*;
pub use mock_transport::*;
pub use record::*;
pub use topic::*;
pub use transport::*;
