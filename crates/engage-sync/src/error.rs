//! Error types for engage-sync

use engage_core::{SnapshotError, TransportError};
use thiserror::Error;

/// Why a user action was refused without touching state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// An identical mutation is already pending
    DuplicatePending,
    /// The record already has the requested membership
    AlreadyApplied,
    /// A compensating request for an earlier toggle is still in flight
    CompensationInFlight,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicatePending => write!(f, "identical mutation already pending"),
            Self::AlreadyApplied => write!(f, "already in requested state"),
            Self::CompensationInFlight => write!(f, "compensating request in flight"),
        }
    }
}

/// Errors returned by the engine handle
#[derive(Debug, Error)]
pub enum SyncError {
    /// The writer task has stopped
    #[error("engine closed")]
    EngineClosed,

    /// The action was refused
    #[error("mutation on {entity_id} rejected: {reason}")]
    Rejected {
        entity_id: String,
        reason: RejectReason,
    },

    /// Transport error
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Snapshot error
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SyncError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        SyncError::EngineClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for SyncError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        SyncError::EngineClosed
    }
}

/// Result type for engine operations
pub type SyncResult<T> = Result<T, SyncError>;
