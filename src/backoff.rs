//! Wait policy for acquires that find the pool at capacity

use std::time::{Duration, Instant};

/// Capped exponential backoff bounded by an overall deadline
///
/// Waiters are normally woken by a release notification; the backoff only
/// caps how long a waiter sleeps before re-checking on its own.
///
/// # Examples
///
/// ```
/// use esox_dbpool::Backoff;
/// use std::time::Duration;
///
/// let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(4));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(1));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(2));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(4));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(4));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub const DEFAULT_INITIAL: Duration = Duration::from_millis(1);
    pub const DEFAULT_MAX: Duration = Duration::from_millis(50);

    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            max: max.max(initial),
        }
    }

    /// Return the next delay and double the one after it, up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Next delay, shortened so it never runs past `deadline`
    pub fn next_delay_until(&mut self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        Some(self.next_delay().min(remaining))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INITIAL, Self::DEFAULT_MAX)
    }
}
