use std::time::Duration;

use tokio::time::Instant;

/// How many wrong passphrases the vault tolerates before backing off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockPolicy {
    pub max_failures: u32,
    /// Lockout after hitting `max_failures`; doubles with each further failure
    pub lockout: Duration,
}

impl Default for UnlockPolicy {
    fn default() -> Self {
        Self {
            max_failures: 5,
            lockout: Duration::from_secs(30),
        }
    }
}

// caps the doubling at 2^10 * lockout
const MAX_BACKOFF_SHIFT: u32 = 10;

#[derive(Debug, Default)]
pub(crate) struct Throttle {
    failures: u32,
    locked_until: Option<Instant>,
}

impl Throttle {
    /// Time left before another attempt is allowed
    pub(crate) fn retry_after(&self, now: Instant) -> Option<Duration> {
        self.locked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    pub(crate) fn record_failure(&mut self, policy: &UnlockPolicy, now: Instant) {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= policy.max_failures {
            let shift = (self.failures - policy.max_failures).min(MAX_BACKOFF_SHIFT);
            self.locked_until = Some(now + policy.lockout * (1u32 << shift));
        }
    }

    pub(crate) fn reset(&mut self) {
        self.failures = 0;
        self.locked_until = None;
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lockout_after_max_failures() {
        let policy = UnlockPolicy {
            max_failures: 3,
            lockout: Duration::from_secs(10),
        };
        let now = Instant::now();
        let mut throttle = Throttle::default();

        throttle.record_failure(&policy, now);
        throttle.record_failure(&policy, now);
        assert_eq!(throttle.retry_after(now), None);

        throttle.record_failure(&policy, now);
        assert_eq!(throttle.retry_after(now), Some(Duration::from_secs(10)));
        assert_eq!(throttle.retry_after(now + Duration::from_secs(10)), None);
    }

    #[test]
    fn test_lockout_doubles() {
        let policy = UnlockPolicy {
            max_failures: 1,
            lockout: Duration::from_secs(5),
        };
        let now = Instant::now();
        let mut throttle = Throttle::default();

        throttle.record_failure(&policy, now);
        assert_eq!(throttle.retry_after(now), Some(Duration::from_secs(5)));
        throttle.record_failure(&policy, now);
        assert_eq!(throttle.retry_after(now), Some(Duration::from_secs(10)));
        throttle.record_failure(&policy, now);
        assert_eq!(throttle.retry_after(now), Some(Duration::from_secs(20)));

        throttle.reset();
        assert_eq!(throttle.failures(), 0);
        assert_eq!(throttle.retry_after(now), None);
    }
}
