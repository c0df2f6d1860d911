//! Monotonic session timestamps.
//!
//! All alignment bookkeeping takes explicit timestamps instead of reading the
//! clock internally, so the hysteresis and cooldown logic can be exercised in
//! tests without sleeping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::time::{Duration, Instant};

/// A point in time measured as a duration since session start.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// Create a timestamp from a duration since session start.
    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    /// Create a timestamp from milliseconds since session start.
    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// The duration since session start.
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Elapsed time since an earlier timestamp, zero if `earlier` is newer.
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.6}s", self.0.as_secs_f64())
    }
}

/// Monotonic clock producing [`Timestamp`]s relative to its creation.
#[derive(Debug, Clone)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    /// Start a new clock; timestamps count from this moment.
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Current timestamp.
    pub fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed())
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let a = Timestamp::from_millis(100);
        let b = Timestamp::from_millis(250);
        assert!(a < b);
        assert_eq!(b.saturating_since(a), Duration::from_millis(150));
        assert_eq!(a.saturating_since(b), Duration::ZERO);
    }

    #[test]
    fn test_add_duration() {
        let a = Timestamp::from_millis(100);
        assert_eq!(a + Duration::from_millis(50), Timestamp::from_millis(150));
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = SessionClock::start();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn test_display() {
        let t = Timestamp::from_millis(1500);
        assert_eq!(format!("{t}"), "1.500000s");
    }
}
