//! Injected environment dependencies.
//!
//! Time is the one ambient dependency the lifecycle logic cares about, so it
//! is abstracted behind a trait and injected rather than read from the
//! system directly. Tests drive the state machine with a settable clock.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
