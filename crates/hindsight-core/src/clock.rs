//! Clock abstraction for write-time stamping.

use chrono::{DateTime, Utc};

/// Abstraction over system time for deterministic behavior.
///
/// Event and snapshot timestamps are stamped from this clock at append
/// time, never supplied by callers.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
