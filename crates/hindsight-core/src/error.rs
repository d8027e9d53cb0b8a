//! Repository and store error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for repository and store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No events exist for an aggregate that was required to exist.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict. Recoverable: reload, reapply, retry.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The version the caller expected.
        expected: i64,
        /// The version actually persisted.
        actual: i64,
    },

    /// A stored discriminator maps to no registered payload decoder.
    #[error("no decoder registered for event `{event_name}`")]
    SchemaResolution {
        /// The discriminator that failed to resolve.
        event_name: String,
    },

    /// A backend I/O, serialization, or infrastructure failure.
    #[error("event store {operation} failed: {detail}")]
    StoreFailure {
        /// The store operation that failed.
        operation: &'static str,
        /// Backend-reported details, including the aggregate id when known.
        detail: String,
    },
}
