//! Hindsight Event Store — durable PostgreSQL backend.
//!
//! Implements the `EventStore` contract over a single `event_log` table
//! holding both event and snapshot rows, with the expected-version check
//! enforced inside the append transaction.

pub mod pg_event_store;
pub mod schema;
