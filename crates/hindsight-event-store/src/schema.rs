//! Event store database schema.
//!
//! One table holds event and snapshot rows. Event rows use the decimal
//! version string as their sort key; snapshot rows use the sentinel key
//! `Snapshot-{version + 1}` and the `Snapshot` event name, so the two kinds
//! never collide and a snapshot sorts immediately after the event it was
//! captured from.

/// SQL to create the event log table and its version index.
pub const CREATE_EVENT_LOG_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS event_log (
    aggregate_id UUID         NOT NULL,
    sort_key     VARCHAR(64)  NOT NULL,
    version      BIGINT       NOT NULL,
    event_name   VARCHAR(255) NOT NULL,
    payload      JSONB        NOT NULL,
    recorded_at  TIMESTAMPTZ  NOT NULL,
    PRIMARY KEY (aggregate_id, sort_key)
);

CREATE INDEX IF NOT EXISTS idx_event_log_aggregate_version
    ON event_log (aggregate_id, version);
";
