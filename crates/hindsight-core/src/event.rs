//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trait that all domain events implement.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Returns the discriminator stored alongside the payload and used to
    /// resolve its concrete shape on read.
    fn event_name(&self) -> &'static str;

    /// Serializes the event payload to JSON.
    fn to_payload(&self) -> serde_json::Value;
}

/// Stored representation of a domain event.
///
/// Versions are assigned at append time, never by the caller, and form a
/// gapless, strictly increasing sequence per aggregate starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Version within the aggregate stream.
    pub version: i64,
    /// Discriminator for payload decoding.
    pub event_name: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Write-time timestamp.
    pub recorded_at: DateTime<Utc>,
}
