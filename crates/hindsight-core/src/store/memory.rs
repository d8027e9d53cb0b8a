//! Deterministic in-memory event store.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::event::StoredEvent;
use crate::snapshot::Snapshot;
use crate::store::{CommittedRange, EventStore};

#[derive(Debug, Default)]
struct Inner {
    events: HashMap<Uuid, Vec<StoredEvent>>,
    snapshots: HashMap<Uuid, Vec<Snapshot>>,
}

/// In-memory reference backend: deterministic and free of external
/// dependencies. Cloning shares the underlying storage.
///
/// As the reference implementation it enforces the stream contract
/// strictly: appends are checked for contiguity, not just for the
/// expected-version match.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every snapshot while keeping all events. Reconstructed state
    /// must not change afterwards, only replay cost; tests use this to
    /// check exactly that.
    pub fn clear_snapshots(&self) {
        self.write().snapshots.clear();
    }

    /// Snapshots currently held for an aggregate, ascending by version.
    #[must_use]
    pub fn snapshots_for(&self, aggregate_id: Uuid) -> Vec<Snapshot> {
        self.read()
            .snapshots
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn upsert_snapshot(list: &mut Vec<Snapshot>, snapshot: &Snapshot) {
    if let Some(existing) = list.iter_mut().find(|s| s.version == snapshot.version) {
        *existing = snapshot.clone();
    } else {
        list.push(snapshot.clone());
        list.sort_by_key(|s| s.version);
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn events_after(
        &self,
        aggregate_id: Uuid,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let inner = self.read();
        Ok(inner
            .events
            .get(&aggregate_id)
            .map_or_else(Vec::new, |stream| {
                stream
                    .iter()
                    .filter(|e| e.version > after_version)
                    .cloned()
                    .collect()
            }))
    }

    async fn aggregate_exists(&self, aggregate_id: Uuid) -> Result<bool, StoreError> {
        let inner = self.read();
        Ok(inner
            .events
            .get(&aggregate_id)
            .is_some_and(|stream| !stream.is_empty()))
    }

    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
        snapshots: &[Snapshot],
    ) -> Result<CommittedRange, StoreError> {
        if events.is_empty() {
            return Err(StoreError::StoreFailure {
                operation: "append",
                detail: format!("aggregate {aggregate_id}: empty event batch"),
            });
        }
        let mut next = expected_version;
        for event in events {
            next += 1;
            if event.version != next {
                return Err(StoreError::StoreFailure {
                    operation: "append",
                    detail: format!(
                        "aggregate {aggregate_id}: batch not contiguous, found version {} where {next} was required",
                        event.version
                    ),
                });
            }
        }

        let mut inner = self.write();
        let current = inner
            .events
            .get(&aggregate_id)
            .and_then(|stream| stream.last())
            .map_or(0, |e| e.version);
        if current != expected_version {
            debug!(
                %aggregate_id,
                expected = expected_version,
                actual = current,
                "append rejected"
            );
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: current,
            });
        }

        inner
            .events
            .entry(aggregate_id)
            .or_default()
            .extend_from_slice(events);
        let snapshot_list = inner.snapshots.entry(aggregate_id).or_default();
        for snapshot in snapshots {
            upsert_snapshot(snapshot_list, snapshot);
        }

        Ok(CommittedRange {
            first: expected_version + 1,
            last: next,
        })
    }

    async fn all_events(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let inner = self.read();
        let mut all: Vec<StoredEvent> = inner.events.values().flatten().cloned().collect();
        all.sort_by(|a, b| {
            a.aggregate_id
                .cmp(&b.aggregate_id)
                .then(a.version.cmp(&b.version))
        });
        Ok(all)
    }

    async fn latest_snapshot(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, StoreError> {
        let inner = self.read();
        Ok(inner
            .snapshots
            .get(&aggregate_id)
            .and_then(|list| list.last())
            .cloned())
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut inner = self.write();
        let list = inner.snapshots.entry(snapshot.aggregate_id).or_default();
        upsert_snapshot(list, snapshot);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        let mut inner = self.write();
        inner.events.clear();
        inner.snapshots.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_event(aggregate_id: Uuid, version: i64) -> StoredEvent {
        StoredEvent {
            aggregate_id,
            version,
            event_name: "test.happened".to_string(),
            payload: serde_json::json!({ "version": version }),
            recorded_at: Utc::now(),
        }
    }

    fn make_snapshot(aggregate_id: Uuid, version: i64) -> Snapshot {
        Snapshot {
            aggregate_id,
            version,
            event_version: version,
            state: serde_json::json!({ "at": version }),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_events_for_unknown_aggregate_is_empty() {
        let store = MemoryEventStore::new();

        let events = store.events_for(Uuid::new_v4()).await.unwrap();

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_append_then_read_preserves_order() {
        let store = MemoryEventStore::new();
        let id = Uuid::new_v4();
        let batch = vec![make_event(id, 1), make_event(id, 2), make_event(id, 3)];

        let range = store.append(id, 0, &batch, &[]).await.unwrap();
        let events = store.events_for(id).await.unwrap();

        assert_eq!(range, CommittedRange { first: 1, last: 3 });
        let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_events_after_skips_up_to_threshold() {
        let store = MemoryEventStore::new();
        let id = Uuid::new_v4();
        let batch: Vec<StoredEvent> = (1..=5).map(|v| make_event(id, v)).collect();
        store.append(id, 0, &batch, &[]).await.unwrap();

        let events = store.events_after(id, 3).await.unwrap();

        let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_stale_expected_version_is_a_conflict() {
        let store = MemoryEventStore::new();
        let id = Uuid::new_v4();
        store
            .append(id, 0, &[make_event(id, 1), make_event(id, 2)], &[])
            .await
            .unwrap();

        let result = store.append(id, 1, &[make_event(id, 2)], &[]).await;

        match result {
            Err(StoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            }) => {
                assert_eq!(aggregate_id, id);
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected concurrency conflict, got {other:?}"),
        }
        // The losing append must not have written anything.
        assert_eq!(store.events_for(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let store = MemoryEventStore::new();

        let result = store.append(Uuid::new_v4(), 0, &[], &[]).await;

        assert!(matches!(
            result,
            Err(StoreError::StoreFailure { operation: "append", .. })
        ));
    }

    #[tokio::test]
    async fn test_non_contiguous_batch_is_rejected() {
        let store = MemoryEventStore::new();
        let id = Uuid::new_v4();

        let result = store
            .append(id, 0, &[make_event(id, 1), make_event(id, 3)], &[])
            .await;

        assert!(matches!(
            result,
            Err(StoreError::StoreFailure { operation: "append", .. })
        ));
        assert!(store.events_for(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_exists_tracks_events() {
        let store = MemoryEventStore::new();
        let id = Uuid::new_v4();

        assert!(!store.aggregate_exists(id).await.unwrap());
        store.append(id, 0, &[make_event(id, 1)], &[]).await.unwrap();
        assert!(store.aggregate_exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_upsert_is_idempotent() {
        let store = MemoryEventStore::new();
        let id = Uuid::new_v4();

        store.save_snapshot(&make_snapshot(id, 3)).await.unwrap();
        store.save_snapshot(&make_snapshot(id, 3)).await.unwrap();

        assert_eq!(store.snapshots_for(id).len(), 1);
    }

    #[tokio::test]
    async fn test_latest_snapshot_picks_highest_version() {
        let store = MemoryEventStore::new();
        let id = Uuid::new_v4();
        store.save_snapshot(&make_snapshot(id, 6)).await.unwrap();
        store.save_snapshot(&make_snapshot(id, 3)).await.unwrap();

        let latest = store.latest_snapshot(id).await.unwrap().unwrap();

        assert_eq!(latest.version, 6);
    }

    #[tokio::test]
    async fn test_append_commits_events_and_snapshots_together() {
        let store = MemoryEventStore::new();
        let id = Uuid::new_v4();
        let batch: Vec<StoredEvent> = (1..=3).map(|v| make_event(id, v)).collect();

        store
            .append(id, 0, &batch, &[make_snapshot(id, 3)])
            .await
            .unwrap();

        assert_eq!(store.events_for(id).await.unwrap().len(), 3);
        assert_eq!(store.snapshots_for(id).len(), 1);
    }

    #[tokio::test]
    async fn test_all_events_is_ordered_by_aggregate_then_version() {
        let store = MemoryEventStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store
            .append(second, 0, &[make_event(second, 1)], &[])
            .await
            .unwrap();
        store
            .append(first, 0, &[make_event(first, 1), make_event(first, 2)], &[])
            .await
            .unwrap();

        let all = store.all_events().await.unwrap();

        assert_eq!(all.len(), 3);
        let ordered: Vec<(Uuid, i64)> = all.iter().map(|e| (e.aggregate_id, e.version)).collect();
        let mut expected = ordered.clone();
        expected.sort();
        assert_eq!(ordered, expected);
    }

    #[tokio::test]
    async fn test_delete_all_clears_events_and_snapshots() {
        let store = MemoryEventStore::new();
        let id = Uuid::new_v4();
        store
            .append(id, 0, &[make_event(id, 1)], &[make_snapshot(id, 1)])
            .await
            .unwrap();

        store.delete_all().await.unwrap();

        assert!(!store.aggregate_exists(id).await.unwrap());
        assert!(store.all_events().await.unwrap().is_empty());
        assert!(store.snapshots_for(id).is_empty());
    }
}
