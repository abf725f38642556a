// ABOUTME: Error taxonomy for the sync engine
// ABOUTME: Each variant maps to one external collaborator so the loop can pick a recovery

use std::fmt;

/// Errors a sync cycle can surface.
///
/// `Query` and `Publish` are recovered locally by the sync loop: the offset is
/// left unchanged and the cycle is retried after a short delay, indefinitely.
/// `Persistence` during commit is retried with backoff inside the cycle; the
/// offset never advances past a failed commit. `Serialization` stops the
/// affected table's loop.
#[derive(Debug, thiserror::Error)]
pub enum ReplicateError {
    /// Source database unreachable or malformed query.
    #[error("source query failed: {0}")]
    Query(String),

    /// Stream unreachable or message rejected. Delivery state of the batch is
    /// unknown: some prefix of it may have reached the broker.
    #[error("stream publish failed: {0}")]
    Publish(String),

    /// Offset store unreachable. Callers must not advance their in-memory
    /// offset when they see this.
    #[error("offset persistence failed: {0}")]
    Persistence(String),

    /// Batch payload could not be encoded.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReplicateError {
    pub fn query(err: impl fmt::Display) -> Self {
        Self::Query(err.to_string())
    }

    pub fn publish(err: impl fmt::Display) -> Self {
        Self::Publish(err.to_string())
    }

    pub fn persistence(err: impl fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}
