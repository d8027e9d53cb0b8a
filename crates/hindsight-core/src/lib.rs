//! Hindsight Core — event-sourced aggregate repository.
//!
//! This crate defines the data model (events, snapshots), the aggregate and
//! store contracts, the event decoder registry, a deterministic in-memory
//! backend, and the repository orchestrator that replays aggregates and
//! commits new events under optimistic concurrency.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod registry;
pub mod repository;
pub mod snapshot;
pub mod store;
