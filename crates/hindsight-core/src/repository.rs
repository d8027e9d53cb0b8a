//! Aggregate repository: replay, optimistic append, snapshot cadence.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::aggregate::AggregateRoot;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::event::{DomainEvent, StoredEvent};
use crate::registry::{DecodeError, EventRegistry};
use crate::snapshot::{Snapshot, SnapshotAware, SnapshotCadence};
use crate::store::EventStore;

/// Per-aggregate-id write locks.
///
/// Saves to distinct aggregates proceed concurrently; saves to the same id
/// serialize around the read-compare-append critical section. One entry is
/// kept per id ever saved through this repository instance.
#[derive(Debug, Default)]
struct StreamLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl StreamLocks {
    fn for_aggregate(&self, aggregate_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(aggregate_id).or_default())
    }
}

/// Event-sourced aggregate repository.
///
/// Reconstructs aggregates from their latest snapshot plus newer events,
/// and commits uncommitted events under optimistic concurrency, capturing
/// a snapshot whenever an assigned version crosses the cadence boundary.
pub struct EventRepository<A: AggregateRoot> {
    store: Arc<dyn EventStore>,
    registry: Arc<EventRegistry<A::Event>>,
    clock: Arc<dyn Clock>,
    cadence: SnapshotCadence,
    locks: StreamLocks,
    _aggregate: PhantomData<A>,
}

impl<A: SnapshotAware> EventRepository<A> {
    /// Creates a repository over the given store and decoder registry,
    /// using the system clock and the default snapshot cadence.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, registry: EventRegistry<A::Event>) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            clock: Arc::new(SystemClock),
            cadence: SnapshotCadence::default(),
            locks: StreamLocks::default(),
            _aggregate: PhantomData,
        }
    }

    /// Replaces the write-time clock, for deterministic timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the snapshot cadence.
    #[must_use]
    pub fn with_cadence(mut self, cadence: SnapshotCadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Reconstructs the aggregate from its latest snapshot plus all newer
    /// events.
    ///
    /// An id with no history yields a fresh aggregate at version 0; use
    /// [`Self::load_existing`] or [`Self::aggregate_exists`] to distinguish
    /// absence from empty state. Reads take no lock and return a
    /// point-in-time view.
    ///
    /// # Errors
    /// `SchemaResolution` when a stored discriminator has no registered
    /// decoder; `StoreFailure` for backend or payload decode failures.
    pub async fn get_by_id(&self, aggregate_id: Uuid) -> Result<A, StoreError> {
        let (mut aggregate, replay_from) = self.snapshot_base(aggregate_id).await?;
        let events = self.store.events_after(aggregate_id, replay_from).await?;
        for stored in &events {
            self.apply_stored(&mut aggregate, stored)?;
        }
        Ok(aggregate)
    }

    /// Like [`Self::get_by_id`], but requires history to exist.
    ///
    /// # Errors
    /// `AggregateNotFound` when the id has no events; otherwise as
    /// [`Self::get_by_id`].
    pub async fn load_existing(&self, aggregate_id: Uuid) -> Result<A, StoreError> {
        let aggregate = self.get_by_id(aggregate_id).await?;
        if aggregate.version() == 0 {
            return Err(StoreError::AggregateNotFound(aggregate_id));
        }
        Ok(aggregate)
    }

    /// Whether at least one event exists for the aggregate.
    ///
    /// # Errors
    /// `StoreFailure` on backend failure.
    pub async fn aggregate_exists(&self, aggregate_id: Uuid) -> Result<bool, StoreError> {
        self.store.aggregate_exists(aggregate_id).await
    }

    /// Persists the aggregate's uncommitted events under optimistic
    /// concurrency, capturing cadence snapshots along the way.
    ///
    /// `expected_version` is the persisted version the caller last
    /// observed. Zero means "first write, no prior state assumed": the
    /// version check is skipped, and the store's append guard rejects the
    /// loser when two creators race to version 1.
    ///
    /// On success the aggregate's version advances to the last committed
    /// version and its uncommitted list is cleared. With no uncommitted
    /// events this is a no-op and the store is never touched.
    ///
    /// # Errors
    /// `ConcurrencyConflict` when the persisted version differs from
    /// `expected_version`; `StoreFailure` on backend failure. On error
    /// nothing is committed and the uncommitted list is left intact.
    pub async fn save(&self, aggregate: &mut A, expected_version: i64) -> Result<(), StoreError> {
        if aggregate.uncommitted_events().is_empty() {
            return Ok(());
        }
        let aggregate_id = aggregate.aggregate_id();
        let lock = self.locks.for_aggregate(aggregate_id);
        let _guard = lock.lock().await;

        let mut shadow = if expected_version == 0 {
            if aggregate.version() == 0 {
                A::new(aggregate_id)
            } else {
                // Carve-out taken with prior history: no version compare,
                // but the shadow replay still needs the persisted base.
                self.get_by_id(aggregate_id).await?
            }
        } else {
            let persisted = self.get_by_id(aggregate_id).await?;
            if persisted.version() != expected_version {
                debug!(
                    %aggregate_id,
                    expected = expected_version,
                    actual = persisted.version(),
                    "save rejected: version mismatch"
                );
                return Err(StoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version,
                    actual: persisted.version(),
                });
            }
            persisted
        };

        // Walk a shadow copy forward one event at a time so each cadence
        // snapshot holds the state as of its own version, not the state
        // after the whole batch.
        let base_version = aggregate.version();
        let mut events = Vec::with_capacity(aggregate.uncommitted_events().len());
        let mut snapshots = Vec::new();
        let mut version = base_version;
        for event in aggregate.uncommitted_events() {
            version += 1;
            shadow.apply(event);
            shadow.set_version(version);
            events.push(StoredEvent {
                aggregate_id,
                version,
                event_name: event.event_name().to_string(),
                payload: event.to_payload(),
                recorded_at: self.clock.now(),
            });
            if self.cadence.is_due(version) {
                snapshots.push(Snapshot {
                    aggregate_id,
                    version,
                    event_version: version,
                    state: shadow.snapshot_state(),
                    recorded_at: self.clock.now(),
                });
            }
        }

        let committed = self
            .store
            .append(aggregate_id, base_version, &events, &snapshots)
            .await?;
        debug!(
            %aggregate_id,
            first = committed.first,
            last = committed.last,
            snapshots = snapshots.len(),
            "events committed"
        );
        aggregate.set_version(committed.last);
        aggregate.clear_uncommitted_events();
        Ok(())
    }

    /// Destructive reset of the underlying store. Test and reset tooling
    /// only.
    ///
    /// # Errors
    /// `StoreFailure` on backend failure.
    pub async fn delete_all(&self) -> Result<(), StoreError> {
        self.store.delete_all().await
    }

    /// Resolves the replay starting point: a restored snapshot base, or a
    /// fresh aggregate when no usable snapshot exists. A snapshot that
    /// fails its cross-check or does not decode is ignored with a warning;
    /// replay falls back to full history.
    async fn snapshot_base(&self, aggregate_id: Uuid) -> Result<(A, i64), StoreError> {
        let Some(snapshot) = self.store.latest_snapshot(aggregate_id).await? else {
            return Ok((A::new(aggregate_id), 0));
        };
        if !snapshot.is_consistent() {
            warn!(
                %aggregate_id,
                version = snapshot.version,
                event_version = snapshot.event_version,
                "snapshot failed version cross-check, replaying full history"
            );
            return Ok((A::new(aggregate_id), 0));
        }
        let mut aggregate = A::new(aggregate_id);
        match aggregate.restore(&snapshot) {
            Ok(()) => Ok((aggregate, snapshot.version)),
            Err(error) => {
                warn!(
                    %aggregate_id,
                    version = snapshot.version,
                    %error,
                    "snapshot state failed to decode, replaying full history"
                );
                // The failed restore may have half-applied state.
                Ok((A::new(aggregate_id), 0))
            }
        }
    }

    fn apply_stored(&self, aggregate: &mut A, stored: &StoredEvent) -> Result<(), StoreError> {
        let event = self
            .registry
            .decode(&stored.event_name, &stored.payload)
            .map_err(|error| match error {
                DecodeError::Unregistered { event_name } => {
                    StoreError::SchemaResolution { event_name }
                }
                DecodeError::Payload { event_name, source } => StoreError::StoreFailure {
                    operation: "decode_event",
                    detail: format!(
                        "aggregate {} version {}: event `{event_name}`: {source}",
                        stored.aggregate_id, stored.version
                    ),
                },
            })?;
        aggregate.apply(&event);
        aggregate.set_version(stored.version);
        Ok(())
    }
}
