//! Test stores — mock `EventStore` implementations for tests.

use async_trait::async_trait;
use hindsight_core::error::StoreError;
use hindsight_core::event::StoredEvent;
use hindsight_core::snapshot::Snapshot;
use hindsight_core::store::{CommittedRange, EventStore};
use uuid::Uuid;

/// An event store that fails every operation with a `StoreFailure`. Useful
/// for testing error-propagation paths.
#[derive(Debug)]
pub struct FailingEventStore;

fn refused(operation: &'static str) -> StoreError {
    StoreError::StoreFailure {
        operation,
        detail: "connection refused".into(),
    }
}

#[async_trait]
impl EventStore for FailingEventStore {
    async fn events_after(
        &self,
        _aggregate_id: Uuid,
        _after_version: i64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        Err(refused("events_after"))
    }

    async fn aggregate_exists(&self, _aggregate_id: Uuid) -> Result<bool, StoreError> {
        Err(refused("aggregate_exists"))
    }

    async fn append(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
        _snapshots: &[Snapshot],
    ) -> Result<CommittedRange, StoreError> {
        Err(refused("append"))
    }

    async fn all_events(&self) -> Result<Vec<StoredEvent>, StoreError> {
        Err(refused("all_events"))
    }

    async fn latest_snapshot(&self, _aggregate_id: Uuid) -> Result<Option<Snapshot>, StoreError> {
        Err(refused("latest_snapshot"))
    }

    async fn save_snapshot(&self, _snapshot: &Snapshot) -> Result<(), StoreError> {
        Err(refused("save_snapshot"))
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        Err(refused("delete_all"))
    }
}
