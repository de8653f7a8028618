//! Wall-clock source for lease arithmetic.

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Lease expiry is absolute wall-clock time, so the renewal loop reads it
/// from here rather than calling [`Utc::now`] directly.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
