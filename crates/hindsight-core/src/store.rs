//! Event store contract.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::event::StoredEvent;
use crate::snapshot::Snapshot;

pub mod memory;

/// Versions committed by a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedRange {
    /// First version written in the batch.
    pub first: i64,
    /// Last version written in the batch.
    pub last: i64,
}

/// Persistence boundary for events and snapshots.
///
/// Event-history reads never surface snapshot rows, and an aggregate with
/// no events yields empty results rather than an error; the repository
/// layers the explicit not-found policy on top.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Events with version strictly greater than `after_version`, in
    /// ascending version order.
    ///
    /// # Errors
    /// `StoreFailure` on backend failure.
    async fn events_after(
        &self,
        aggregate_id: Uuid,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    /// Full event history for an aggregate, in ascending version order.
    ///
    /// # Errors
    /// `StoreFailure` on backend failure.
    async fn events_for(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, StoreError> {
        self.events_after(aggregate_id, 0).await
    }

    /// Whether at least one event exists for the aggregate.
    ///
    /// # Errors
    /// `StoreFailure` on backend failure.
    async fn aggregate_exists(&self, aggregate_id: Uuid) -> Result<bool, StoreError>;

    /// Atomically appends a pre-stamped batch of events plus any snapshots
    /// captured during the same save. Either the whole batch commits or
    /// none of it does.
    ///
    /// `expected_version` is the stream version immediately before the
    /// first event of the batch; the store rejects the append when the
    /// persisted stream disagrees. This check is the backend-enforced
    /// compare-and-swap guarding concurrent writers.
    ///
    /// # Errors
    /// `ConcurrencyConflict` when the persisted version differs from
    /// `expected_version`; `StoreFailure` for an empty or non-contiguous
    /// batch and for backend failures.
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
        snapshots: &[Snapshot],
    ) -> Result<CommittedRange, StoreError>;

    /// Every event in the store, ordered by aggregate id then version.
    /// Audit and rebuild tooling only, never a hot path.
    ///
    /// # Errors
    /// `StoreFailure` on backend failure.
    async fn all_events(&self) -> Result<Vec<StoredEvent>, StoreError>;

    /// Most recent snapshot for the aggregate, if any. A stored snapshot
    /// that no longer decodes is reported as absent, never as an error, so
    /// replay falls back to full history.
    ///
    /// # Errors
    /// `StoreFailure` on backend failure.
    async fn latest_snapshot(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, StoreError>;

    /// Idempotent upsert of a snapshot, keyed by aggregate id and the
    /// snapshot sort key so snapshot rows never collide with event rows.
    ///
    /// # Errors
    /// `StoreFailure` on backend failure.
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Destructive reset of all events and snapshots. Test and reset
    /// tooling only.
    ///
    /// # Errors
    /// `StoreFailure` on backend failure.
    async fn delete_all(&self) -> Result<(), StoreError>;
}
