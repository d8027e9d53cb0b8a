//! Snapshot types and cadence policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::AggregateRoot;

/// Sentinel discriminator marking snapshot rows in the store. Event-history
/// reads filter it; the registry refuses to register it.
pub const SNAPSHOT_EVENT_NAME: &str = "Snapshot";

/// Point-in-time capture of aggregate state at a given event version.
///
/// A snapshot is a derived, disposable artifact: deleting every snapshot
/// must never change reconstructed state, only replay cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Aggregate the snapshot belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate version at capture time.
    pub version: i64,
    /// Redundant cross-check mirroring `version`; a mismatch marks the
    /// snapshot as corrupt and replay falls back to full history.
    pub event_version: i64,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
    /// Capture timestamp, from the write-time clock.
    pub recorded_at: DateTime<Utc>,
}

impl Snapshot {
    /// Sort key for the persisted row: one past the captured version,
    /// prefixed so snapshot rows never collide with event version keys and
    /// sort immediately after the event they were captured from.
    #[must_use]
    pub fn sort_key(&self) -> String {
        format!("{}-{}", SNAPSHOT_EVENT_NAME, self.version + 1)
    }

    /// Whether the redundant version cross-check holds.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.version == self.event_version
    }
}

/// How often the repository materializes a snapshot during save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotCadence {
    stride: i64,
}

impl SnapshotCadence {
    /// Snapshot every `stride` events, the first at version `stride`.
    ///
    /// # Panics
    /// Panics if `stride` is less than 1.
    #[must_use]
    pub fn every(stride: i64) -> Self {
        assert!(stride >= 1, "snapshot stride must be at least 1");
        Self { stride }
    }

    /// Whether an event committed at `version` triggers a snapshot.
    #[must_use]
    pub fn is_due(self, version: i64) -> bool {
        version >= self.stride && version % self.stride == 0
    }
}

impl Default for SnapshotCadence {
    /// Every third event.
    fn default() -> Self {
        Self::every(3)
    }
}

/// Capability to capture aggregate state into a snapshot and restore from
/// one.
pub trait SnapshotAware: AggregateRoot {
    /// Serializes current domain state for snapshot storage.
    fn snapshot_state(&self) -> serde_json::Value;

    /// Restores domain state from a snapshot and sets the version to the
    /// snapshot's version.
    ///
    /// # Errors
    /// Returns the decode error when the snapshot state does not match the
    /// aggregate's expected shape. The instance may be partially restored
    /// on error and must be discarded by the caller.
    fn restore(&mut self, snapshot: &Snapshot) -> Result<(), serde_json::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cadence_is_every_third_event() {
        let cadence = SnapshotCadence::default();

        let due: Vec<i64> = (1..=10).filter(|v| cadence.is_due(*v)).collect();

        assert_eq!(due, vec![3, 6, 9]);
    }

    #[test]
    fn test_cadence_never_due_at_version_zero_or_below_stride() {
        let cadence = SnapshotCadence::every(5);

        assert!(!cadence.is_due(0));
        assert!(!cadence.is_due(4));
        assert!(cadence.is_due(5));
        assert!(cadence.is_due(10));
    }

    #[test]
    fn test_stride_one_snapshots_every_event() {
        let cadence = SnapshotCadence::every(1);

        assert!(cadence.is_due(1));
        assert!(cadence.is_due(2));
    }

    #[test]
    #[should_panic(expected = "snapshot stride must be at least 1")]
    fn test_zero_stride_is_rejected() {
        let _ = SnapshotCadence::every(0);
    }

    #[test]
    fn test_sort_key_is_one_past_captured_version() {
        let snapshot = Snapshot {
            aggregate_id: uuid::Uuid::new_v4(),
            version: 3,
            event_version: 3,
            state: serde_json::json!({}),
            recorded_at: chrono::Utc::now(),
        };

        assert_eq!(snapshot.sort_key(), "Snapshot-4");
    }

    #[test]
    fn test_cross_check_detects_mismatch() {
        let snapshot = Snapshot {
            aggregate_id: uuid::Uuid::new_v4(),
            version: 3,
            event_version: 4,
            state: serde_json::json!({}),
            recorded_at: chrono::Utc::now(),
        };

        assert!(!snapshot.is_consistent());
    }
}
