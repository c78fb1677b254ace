use chrono::{Local, NaiveDateTime};
use std::fmt;

/// Source of "now" for triggers and requests.
///
/// Triggers reason in local wall-clock time (time of day, week days), so the
/// clock hands out naive local timestamps.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> NaiveDateTime;
}

/// Production clock backed by the host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[cfg(test)]
pub use manual::ManualClock;


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at(2024, 1, 1, 8, 0);
        let start = clock.now();

        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now() - start, Duration::seconds(90));
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
