//! Error types for the engagement synchronizer

use thiserror::Error;

/// Top-level error type for collaborator-facing operations
#[derive(Debug, Error)]
pub enum EngageError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),
}

/// Errors raised while decoding a push frame into a typed event
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed {event} payload: {reason}")]
    Malformed { event: String, reason: String },

    #[error("Missing field `{field}` in {event} payload")]
    MissingField { event: String, field: &'static str },
}

/// Errors related to the push transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Subscribe to {topic} failed: {reason}")]
    SubscribeFailed { topic: String, reason: String },

    #[error("Not connected")]
    NotConnected,
}

/// Errors returned by a snapshot provider
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot request failed: {0}")]
    RequestFailed(String),

    #[error("Snapshot response invalid: {0}")]
    InvalidResponse(String),
}

/// Errors returned by the outbound mutation endpoint
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    /// Network-level failure; the user may retry
    #[error("Mutation request failed: {0}")]
    Network(String),

    /// The server refused the mutation
    #[error("Mutation rejected by server: {0}")]
    Rejected(String),
}

impl MutationError {
    /// Whether retrying the same action could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, MutationError::Network(_))
    }
}

/// Result type alias for collaborator operations
pub type EngageResult<T> = Result<T, EngageError>;
