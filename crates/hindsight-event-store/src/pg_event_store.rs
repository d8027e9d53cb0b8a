//! `PostgreSQL` implementation of the `EventStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use hindsight_core::error::StoreError;
use hindsight_core::event::StoredEvent;
use hindsight_core::snapshot::{SNAPSHOT_EVENT_NAME, Snapshot};
use hindsight_core::store::{CommittedRange, EventStore};

use crate::schema::CREATE_EVENT_LOG_TABLE;

/// PostgreSQL-backed event store.
///
/// Appends run in a single transaction: the expected-version check, the
/// event inserts, and any snapshot upserts commit together or not at all.
/// The `(aggregate_id, sort_key)` primary key backstops the version check
/// when two writers race past it concurrently.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    aggregate_id: Uuid,
    version: i64,
    event_name: String,
    payload: serde_json::Value,
    recorded_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            aggregate_id: row.aggregate_id,
            version: row.version,
            event_name: row.event_name,
            payload: row.payload,
            recorded_at: row.recorded_at,
        }
    }
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `event_log` table and its index when absent: the
    /// programmatic twin of the workspace migration, for deployments that
    /// provision on startup.
    ///
    /// # Errors
    /// `StoreFailure` when the DDL fails.
    pub async fn provision(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(CREATE_EVENT_LOG_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::StoreFailure {
                operation: "provision",
                detail: e.to_string(),
            })?;
        Ok(())
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

/// Highest committed event version for the aggregate, 0 when none exist.
async fn current_version<'e, E>(executor: E, aggregate_id: Uuid) -> Result<i64, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_scalar(
        "SELECT COALESCE(MAX(version), 0) FROM event_log
         WHERE aggregate_id = $1 AND event_name <> $2",
    )
    .bind(aggregate_id)
    .bind(SNAPSHOT_EVENT_NAME)
    .fetch_one(executor)
    .await
    .map_err(|e| StoreError::StoreFailure {
        operation: "current_version",
        detail: format!("aggregate {aggregate_id}: {e}"),
    })
}

async fn upsert_snapshot<'e, E>(
    executor: E,
    snapshot: &Snapshot,
    operation: &'static str,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let body = serde_json::to_value(snapshot).map_err(|e| StoreError::StoreFailure {
        operation,
        detail: format!(
            "aggregate {}: snapshot serialization: {e}",
            snapshot.aggregate_id
        ),
    })?;
    sqlx::query(
        "INSERT INTO event_log (aggregate_id, sort_key, version, event_name, payload, recorded_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (aggregate_id, sort_key)
         DO UPDATE SET version = EXCLUDED.version,
                       payload = EXCLUDED.payload,
                       recorded_at = EXCLUDED.recorded_at",
    )
    .bind(snapshot.aggregate_id)
    .bind(snapshot.sort_key())
    .bind(snapshot.version)
    .bind(SNAPSHOT_EVENT_NAME)
    .bind(&body)
    .bind(snapshot.recorded_at)
    .execute(executor)
    .await
    .map_err(|e| StoreError::StoreFailure {
        operation,
        detail: format!("aggregate {}: {e}", snapshot.aggregate_id),
    })?;
    Ok(())
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn events_after(
        &self,
        aggregate_id: Uuid,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT aggregate_id, version, event_name, payload, recorded_at
             FROM event_log
             WHERE aggregate_id = $1 AND version > $2 AND event_name <> $3
             ORDER BY version ASC",
        )
        .bind(aggregate_id)
        .bind(after_version)
        .bind(SNAPSHOT_EVENT_NAME)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::StoreFailure {
            operation: "events_after",
            detail: format!("aggregate {aggregate_id}: {e}"),
        })?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn aggregate_exists(&self, aggregate_id: Uuid) -> Result<bool, StoreError> {
        sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM event_log
                 WHERE aggregate_id = $1 AND event_name <> $2
             )",
        )
        .bind(aggregate_id)
        .bind(SNAPSHOT_EVENT_NAME)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::StoreFailure {
            operation: "aggregate_exists",
            detail: format!("aggregate {aggregate_id}: {e}"),
        })
    }

    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
        snapshots: &[Snapshot],
    ) -> Result<CommittedRange, StoreError> {
        let (Some(first), Some(last)) = (events.first(), events.last()) else {
            return Err(StoreError::StoreFailure {
                operation: "append",
                detail: format!("aggregate {aggregate_id}: empty event batch"),
            });
        };
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

        let mut tx = self.pool.begin().await.map_err(|e| StoreError::StoreFailure {
            operation: "append",
            detail: format!("aggregate {aggregate_id}: {e}"),
        })?;

        let current = current_version(&mut *tx, aggregate_id).await?;
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

        for event in events {
            let insert = sqlx::query(
                "INSERT INTO event_log (aggregate_id, sort_key, version, event_name, payload, recorded_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(event.aggregate_id)
            .bind(event.version.to_string())
            .bind(event.version)
            .bind(&event.event_name)
            .bind(&event.payload)
            .bind(event.recorded_at)
            .execute(&mut *tx)
            .await;
            match insert {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    // A concurrent writer won the race after our version
                    // check; the transaction rolls back on drop.
                    drop(tx);
                    let actual = current_version(&self.pool, aggregate_id).await?;
                    return Err(StoreError::ConcurrencyConflict {
                        aggregate_id,
                        expected: expected_version,
                        actual,
                    });
                }
                Err(e) => {
                    return Err(StoreError::StoreFailure {
                        operation: "append",
                        detail: format!("aggregate {aggregate_id} version {}: {e}", event.version),
                    });
                }
            }
        }

        for snapshot in snapshots {
            upsert_snapshot(&mut *tx, snapshot, "append").await?;
        }

        tx.commit().await.map_err(|e| StoreError::StoreFailure {
            operation: "append",
            detail: format!("aggregate {aggregate_id}: {e}"),
        })?;

        debug!(
            %aggregate_id,
            first = first.version,
            last = last.version,
            snapshots = snapshots.len(),
            "batch committed"
        );
        Ok(CommittedRange {
            first: first.version,
            last: last.version,
        })
    }

    async fn all_events(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT aggregate_id, version, event_name, payload, recorded_at
             FROM event_log
             WHERE event_name <> $1
             ORDER BY aggregate_id, version",
        )
        .bind(SNAPSHOT_EVENT_NAME)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::StoreFailure {
            operation: "all_events",
            detail: e.to_string(),
        })?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn latest_snapshot(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, StoreError> {
        let body: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT payload FROM event_log
             WHERE aggregate_id = $1 AND event_name = $2
             ORDER BY version DESC
             LIMIT 1",
        )
        .bind(aggregate_id)
        .bind(SNAPSHOT_EVENT_NAME)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::StoreFailure {
            operation: "latest_snapshot",
            detail: format!("aggregate {aggregate_id}: {e}"),
        })?;
        match body {
            None => Ok(None),
            Some(value) => match serde_json::from_value(value) {
                Ok(snapshot) => Ok(Some(snapshot)),
                Err(error) => {
                    // An undecodable row must not make the aggregate unreadable.
                    warn!(%aggregate_id, %error, "snapshot row failed to decode, ignoring");
                    Ok(None)
                }
            },
        }
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        upsert_snapshot(&self.pool, snapshot, "save_snapshot").await
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        sqlx::query("TRUNCATE TABLE event_log")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::StoreFailure {
                operation: "delete_all",
                detail: e.to_string(),
            })?;
        Ok(())
    }
}
