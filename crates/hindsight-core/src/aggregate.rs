//! Aggregate root abstraction.

use uuid::Uuid;

use crate::event::DomainEvent;

/// Trait for aggregate roots that reconstitute from event history.
///
/// `version` always means the last *committed* version: replay advances it
/// as each stored event is applied, and a successful save advances it past
/// the batch. Recording a fresh event leaves it untouched, because versions
/// are assigned at append time, never by the caller.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Creates an empty instance at version 0 for the given id.
    fn new(aggregate_id: Uuid) -> Self
    where
        Self: Sized;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the last committed version (0 before the first commit).
    fn version(&self) -> i64;

    /// Sets the version. Called during replay and on commit confirmation,
    /// never from domain operations.
    fn set_version(&mut self, version: i64);

    /// Apply an event to mutate internal state. State transition only; no
    /// version bookkeeping.
    fn apply(&mut self, event: &Self::Event);

    /// Returns uncommitted events produced by domain operations.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Mutable access to the uncommitted-event list. The aggregate owns
    /// the list; the repository only reads it and clears it after a commit.
    fn uncommitted_events_mut(&mut self) -> &mut Vec<Self::Event>;

    /// Applies a freshly raised event and queues it for the next save.
    fn record(&mut self, event: Self::Event) {
        self.apply(&event);
        self.uncommitted_events_mut().push(event);
    }

    /// Clears uncommitted events after persistence.
    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events_mut().clear();
    }
}
