//! Time sources for driving the protocol core
//!
//! The core works on wall-clock seconds (`f64`) because the sender timestamp
//! travels on the wire and is compared against the receiver's clock. A
//! [`Clock`] supplies that value and knows how to wait; [`ManualClock`]
//! replaces both with a shared counter so event loops run without sleeping
//! in tests.

use gamenet_protocol::wall_clock_secs;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Source of the current time in seconds since the Unix epoch
pub trait Clock {
    fn now(&self) -> f64;

    /// Block for `duration` (or pretend to)
    fn sleep(&self, duration: Duration);
}

/// The host's wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> f64 {
        wall_clock_secs()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Clock that only moves when told to
///
/// Clones share the same time, so a test can keep a handle while an
/// endpoint owns another. Sleeping advances the shared time instantly.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: f64) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock() += duration.as_secs_f64();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> f64 {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Timer for periodic operations
///
/// Used for send pacing and periodic statistics output.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    interval: f64,
    last_fire: f64,
}

impl Timer {
    /// Create a new timer with the given interval, started at `now`
    pub fn new(interval: Duration, now: f64) -> Self {
        Timer {
            interval: interval.as_secs_f64(),
            last_fire: now,
        }
    }

    /// Check if the timer has expired
    pub fn expired(&self, now: f64) -> bool {
        now - self.last_fire >= self.interval
    }

    /// Reset the timer
    pub fn reset(&mut self, now: f64) {
        self.last_fire = now;
    }

    /// Time at which the timer next expires
    pub fn deadline(&self) -> f64 {
        self.last_fire + self.interval
    }

    /// Get time until next expiration
    pub fn time_until_expiration(&self, now: f64) -> Duration {
        let remaining = self.deadline() - now;
        if remaining <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(remaining)
        }
    }

    /// Fire the timer if expired, returning true if it fired
    ///
    /// The next deadline is scheduled from the previous one rather than from
    /// `now`, so a late caller does not accumulate drift.
    pub fn try_fire(&mut self, now: f64) -> bool {
        if !self.expired(now) {
            return false;
        }
        self.last_fire = if now - self.deadline() >= self.interval {
            now
        } else {
            self.deadline()
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_wall_time() {
        let now = SystemClock.now();
        // Some time after 2020-01-01
        assert!(now > 1_577_836_800.0);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(100.0);
        let handle = clock.clone();

        clock.advance(Duration::from_millis(250));
        assert_eq!(handle.now(), 100.25);

        handle.sleep(Duration::from_millis(750));
        assert_eq!(clock.now(), 101.0);

        clock.set(5.0);
        assert_eq!(handle.now(), 5.0);
    }

    #[test]
    fn test_timer() {
        let mut timer = Timer::new(Duration::from_millis(10), 0.0);
        assert!(!timer.expired(0.005));
        assert!(timer.expired(0.011));

        timer.reset(0.011);
        assert!(!timer.expired(0.015));
        assert_eq!(timer.time_until_expiration(0.1), Duration::ZERO);
    }

    #[test]
    fn test_timer_try_fire() {
        let mut timer = Timer::new(Duration::from_millis(20), 0.0);
        assert!(!timer.try_fire(0.01));
        assert!(timer.try_fire(0.025));
        assert!(!timer.try_fire(0.03));
        // Scheduled from the previous deadline, not from the late call
        assert!(timer.try_fire(0.04));
    }

    #[test]
    fn test_timer_resyncs_after_long_stall() {
        let mut timer = Timer::new(Duration::from_millis(20), 0.0);
        assert!(timer.try_fire(1.0));
        assert!(!timer.try_fire(1.01));
        assert!((timer.deadline() - 1.02).abs() < 1e-9);
    }
}
