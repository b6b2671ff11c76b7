//! Retry pacing for RPC connection attempts

use std::time::Duration;

/// Attempts below this are logged at debug only
const QUIET_ATTEMPTS: u32 = 5;

/// Capped exponential backoff with jitter
pub struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
    /// Fraction of the delay added at random (0.0 to 1.0)
    jitter: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            current: initial,
            max: max.max(initial),
            multiplier,
            jitter,
        }
    }

    /// Backoff starting at `interval`, growing to six times that
    pub fn for_interval(interval: Duration) -> Self {
        Self::new(interval, interval * 6, 1.5, 0.1)
    }

    /// Get the next delay and advance
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        let next = Duration::from_secs_f64(self.current.as_secs_f64() * self.multiplier);
        self.current = next.min(self.max);

        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        delay + Duration::from_secs_f64(jitter_amount)
    }
}

/// Whether a failed attempt should be logged loudly
///
/// The first few failures are expected while a service boots; after that
/// every fifth attempt is reported.
pub fn should_warn(attempts: u32) -> bool {
    attempts >= QUIET_ATTEMPTS && attempts % QUIET_ATTEMPTS == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_to_cap() {
        let mut backoff =
            Backoff::new(Duration::from_secs(2), Duration::from_secs(5), 2.0, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_warn_throttle() {
        let loud: Vec<u32> = (1..=20).filter(|n| should_warn(*n)).collect();
        assert_eq!(loud, vec![5, 10, 15, 20]);
    }
}
