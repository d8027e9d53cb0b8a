//! Audit and maintenance CLI for the hindsight event log.
//!
//! # Commands
//!
//! - `hindsight-audit scan` - Print every committed event as JSON lines
//! - `hindsight-audit verify` - Check that each stream runs gaplessly from 1
//! - `hindsight-audit reset --yes` - Delete every event and snapshot

use std::collections::BTreeMap;
use std::error::Error;

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use hindsight_core::store::EventStore;
use hindsight_event_store::pg_event_store::PgEventStore;

#[derive(Parser)]
#[command(name = "hindsight-audit")]
#[command(version)]
#[command(about = "Inspect and maintain the hindsight event log")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every committed event to stdout, one JSON object per line
    Scan,

    /// Check that every aggregate's versions run gaplessly from 1
    Verify,

    /// Delete every event and snapshot from the log
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Read configuration from environment.
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL environment variable must be set")?;

    // Create database connection pool.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let store = PgEventStore::new(pool);
    store.provision().await?;

    match cli.command {
        Commands::Scan => scan(&store).await,
        Commands::Verify => verify(&store).await,
        Commands::Reset { yes } => reset(&store, yes).await,
    }
}

async fn scan(store: &PgEventStore) -> Result<(), Box<dyn Error>> {
    let events = store.all_events().await?;
    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }
    tracing::info!(events = events.len(), "scan complete");
    Ok(())
}

async fn verify(store: &PgEventStore) -> Result<(), Box<dyn Error>> {
    let events = store.all_events().await?;
    let mut streams: BTreeMap<Uuid, Vec<i64>> = BTreeMap::new();
    for event in events {
        streams
            .entry(event.aggregate_id)
            .or_default()
            .push(event.version);
    }

    let total = streams.len();
    let mut violations = 0usize;
    for (aggregate_id, versions) in &streams {
        if let Some(detail) = stream_violation(versions) {
            violations += 1;
            tracing::error!(%aggregate_id, detail, "stream is not gapless");
        }
    }

    tracing::info!(streams = total, violations, "verify complete");
    if violations > 0 {
        return Err(format!("{violations} of {total} streams are not gapless from 1").into());
    }
    Ok(())
}

/// Versions arrive in stream order; a healthy stream reads 1, 2, 3, ...
fn stream_violation(versions: &[i64]) -> Option<String> {
    let mut previous = 0;
    for &version in versions {
        if version != previous + 1 {
            return Some(format!("version {version} follows {previous}"));
        }
        previous = version;
    }
    None
}

async fn reset(store: &PgEventStore, yes: bool) -> Result<(), Box<dyn Error>> {
    if !yes {
        return Err("refusing to delete the event log without --yes".into());
    }
    store.delete_all().await?;
    tracing::info!("event log cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::stream_violation;

    #[test]
    fn test_a_healthy_stream_has_no_violation() {
        assert_eq!(stream_violation(&[1, 2, 3, 4]), None);
    }

    #[test]
    fn test_a_stream_must_start_at_one() {
        assert_eq!(
            stream_violation(&[2, 3]),
            Some("version 2 follows 0".to_string())
        );
    }

    #[test]
    fn test_a_gap_is_reported_with_both_versions() {
        assert_eq!(
            stream_violation(&[1, 2, 4]),
            Some("version 4 follows 2".to_string())
        );
    }

    #[test]
    fn test_an_empty_stream_is_trivially_gapless() {
        assert_eq!(stream_violation(&[]), None);
    }
}
