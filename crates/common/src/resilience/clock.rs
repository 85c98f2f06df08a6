//! Clock and sleeper abstractions.
//!
//! Token expiry checks read wall-clock time and peer polling blocks the
//! thread between rounds. Both go through the traits here so tests can run a
//! full six-round wait without sleeping.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Clock abstraction for testability
///
/// Allows injecting mock clocks for deterministic testing of expiry checks
/// and polling deadlines.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Wall-clock time as a UTC timestamp
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.system_time())
    }

    /// Seconds since UNIX epoch
    fn epoch_secs(&self) -> u64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }
}

/// Blocks the calling thread for a duration.
pub trait Sleeper: Send + Sync + 'static {
    /// Sleep for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Real system clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl Sleeper for SystemClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

impl<T: Sleeper + ?Sized> Sleeper for Arc<T> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

#[derive(Debug, Default)]
struct MockClockState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// Mock clock for deterministic testing
///
/// Time only moves when a test calls [`MockClock::advance`] or when code under
/// test calls [`Sleeper::sleep`], which advances virtual time and records the
/// requested duration. Clones share the same timeline.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    wall_base: SystemTime,
    state: Arc<Mutex<MockClockState>>,
}

impl MockClock {
    /// Create a mock clock whose wall time starts at the UNIX epoch.
    pub fn new() -> Self {
        Self::at_system_time(UNIX_EPOCH)
    }

    /// Create a mock clock whose wall time starts `secs` after the UNIX epoch.
    pub fn at_epoch_secs(secs: u64) -> Self {
        Self::at_system_time(UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Create a mock clock whose wall time starts at `wall_base`.
    pub fn at_system_time(wall_base: SystemTime) -> Self {
        Self {
            start: Instant::now(),
            wall_base,
            state: Arc::new(Mutex::new(MockClockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockClockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Advance the clock by the specified duration
    pub fn advance(&self, duration: Duration) {
        self.state().elapsed += duration;
    }

    /// Advance the clock by whole seconds
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Total virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        self.state().elapsed
    }

    /// Durations passed to [`Sleeper::sleep`], in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state().sleeps.clone()
    }

    /// Number of times [`Sleeper::sleep`] was called
    pub fn sleep_count(&self) -> usize {
        self.state().sleeps.len()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.wall_base + self.elapsed()
    }
}

impl Sleeper for MockClock {
    fn sleep(&self, duration: Duration) {
        let mut state = self.state();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `MockClock::new` behavior for the mock clock advance scenario.
    ///
    /// Assertions:
    /// - Confirms monotonic and wall time move together.
    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::at_epoch_secs(1_000);
        let start = clock.now();

        clock.advance_secs(5);

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
        assert_eq!(clock.epoch_secs(), 1_005);
    }

    /// Validates `Sleeper::sleep` behavior for the mock clock sleep scenario.
    ///
    /// Assertions:
    /// - Confirms sleeping advances virtual time and is recorded.
    #[test]
    fn test_mock_clock_sleep_records_and_advances() {
        let clock = MockClock::new();

        clock.sleep(Duration::from_millis(250));
        clock.sleep(Duration::from_millis(750));

        assert_eq!(clock.elapsed(), Duration::from_secs(1));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250), Duration::from_millis(750)]);
        assert_eq!(clock.sleep_count(), 2);
    }

    /// Validates `MockClock::clone` behavior for the shared timeline scenario.
    ///
    /// Assertions:
    /// - Confirms clones observe each other's advances.
    #[test]
    fn test_mock_clock_clones_share_state() {
        let clock = MockClock::new();
        let shared = clock.clone();

        shared.advance_secs(30);

        assert_eq!(clock.elapsed(), Duration::from_secs(30));
    }

    #[test]
    fn test_now_utc_matches_epoch_secs() {
        let clock = MockClock::at_epoch_secs(1_700_000_000);
        assert_eq!(clock.now_utc().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_system_clock_zero_sleep_returns() {
        SystemClock.sleep(Duration::ZERO);
        assert!(SystemClock.epoch_secs() > 0);
    }
}
