/// Wall-clock access and timed suspension.
///
/// Every blocking point of the service (quota wait, retry backoff, request
/// pacing, the daily cutoff sleep) goes through [`Clock`], so the whole
/// engine runs against [`ManualClock`] in tests without really sleeping.

use chrono::{Local, NaiveDateTime};
use std::cell::{Cell, RefCell};
use std::time::Duration;

/// Source of local wall-clock time plus the ability to block the thread.
pub trait Clock {
    /// Current local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Blocks until `deadline` (local wall time). Returns immediately when the
    /// deadline has passed. Re-checks the clock after each sleep so an early
    /// wake-up resumes waiting.
    fn sleep_until(&self, deadline: NaiveDateTime) {
        loop {
            let remaining = deadline - self.now();
            match remaining.to_std() {
                Ok(d) if !d.is_zero() => self.sleep(d),
                _ => return,
            }
        }
    }
}

/// The real local clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock: `sleep` advances time instantly and records the request.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<NaiveDateTime>,
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Cell::new(start),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    /// Moves the clock without recording a sleep.
    pub fn set(&self, now: NaiveDateTime) {
        self.now.set(now);
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    /// Number of sleeps of exactly `duration`.
    pub fn sleeps_of(&self, duration: Duration) -> usize {
        self.sleeps.borrow().iter().filter(|d| **d == duration).count()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        self.now.set(self.now.get() + step);
        self.sleeps.borrow_mut().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new(dt("2024-05-01 10:00:00"));
        clock.sleep(Duration::from_secs(90));
        assert_eq!(clock.now(), dt("2024-05-01 10:01:30"));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(90)]);
    }

    #[test]
    fn test_sleep_until_past_deadline_does_not_sleep() {
        let clock = ManualClock::new(dt("2024-05-01 10:00:00"));
        clock.sleep_until(dt("2024-05-01 09:00:00"));
        clock.sleep_until(dt("2024-05-01 10:00:00"));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_sleep_until_future_deadline() {
        let clock = ManualClock::new(dt("2024-05-01 10:00:00"));
        clock.sleep_until(dt("2024-05-01 23:50:00"));
        assert_eq!(clock.now(), dt("2024-05-01 23:50:00"));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(13 * 3600 + 50 * 60)]);
    }
}
