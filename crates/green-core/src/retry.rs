//! Fixed-interval retry policy.
//!
//! Connectivity on a node is a gate: until the link is up there is nothing
//! else to do, so the default policies retry forever at a fixed interval with
//! no backoff. A bounded policy turns the same loop into one that gives up.

use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

/// Blocking delay, injectable so tests do not wait on the wall clock.
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

/// How often to retry and when to give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between two consecutive attempts.
    pub interval: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<NonZeroU32>,
}

impl RetryPolicy {
    /// WiFi association status poll.
    pub const WIFI_POLL: RetryPolicy = RetryPolicy::forever(Duration::from_millis(500));

    /// MQTT connect attempt.
    pub const MQTT_CONNECT: RetryPolicy = RetryPolicy::forever(Duration::from_millis(2000));

    /// SNTP time poll.
    pub const SNTP_POLL: RetryPolicy = RetryPolicy::forever(Duration::from_millis(500));

    pub const fn forever(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    pub const fn bounded(interval: Duration, max_attempts: NonZeroU32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }

    /// Same interval, stop after `max_attempts`.
    pub const fn with_max_attempts(self, max_attempts: NonZeroU32) -> Self {
        Self::bounded(self.interval, max_attempts)
    }

    /// Interval in whole milliseconds, saturating at `u32::MAX`.
    pub fn interval_ms(&self) -> u32 {
        u32::try_from(self.interval.as_millis()).unwrap_or(u32::MAX)
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none()
    }
}

/// Fires once every `every` ticks, e.g. to re-issue a request from inside a
/// status poll without blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollCadence {
    every: NonZeroU32,
    ticks: u32,
}

impl PollCadence {
    pub const fn new(every: NonZeroU32) -> Self {
        Self { every, ticks: 0 }
    }

    /// Count one poll. Returns `true` on every `every`-th call since the last reset.
    pub fn tick(&mut self) -> bool {
        self.ticks += 1;
        if self.ticks >= self.every.get() {
            self.ticks = 0;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
    }
}

/// Errors from [`retry_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RetryError {
    /// A bounded policy ran out of attempts.
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Call `attempt` until it returns `true`.
///
/// `attempt` receives the 1-based attempt number. The delay runs only
/// between attempts, never after the successful one. Returns the number of
/// attempts made.
pub fn retry_until<D, F>(policy: &RetryPolicy, delay: &mut D, mut attempt: F) -> Result<u32, RetryError>
where
    D: Delay + ?Sized,
    F: FnMut(u32) -> bool,
{
    let mut attempts: u32 = 0;
    loop {
        attempts = attempts.saturating_add(1);
        if attempt(attempts) {
            return Ok(attempts);
        }

        if let Some(max) = policy.max_attempts {
            if attempts >= max.get() {
                return Err(RetryError::Exhausted { attempts });
            }
        }

        delay.delay_ms(policy.interval_ms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingDelay {
        calls: Vec<u32>,
    }

    impl Delay for RecordingDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.calls.push(ms);
        }
    }

    #[test]
    fn test_default_intervals() {
        assert_eq!(RetryPolicy::WIFI_POLL.interval_ms(), 500);
        assert_eq!(RetryPolicy::MQTT_CONNECT.interval_ms(), 2000);
        assert!(RetryPolicy::WIFI_POLL.is_unbounded());
        assert!(RetryPolicy::MQTT_CONNECT.is_unbounded());
    }

    #[test]
    fn test_immediate_success_does_not_delay() {
        let mut delay = RecordingDelay::default();
        let attempts = retry_until(&RetryPolicy::WIFI_POLL, &mut delay, |_| true).unwrap();

        assert_eq!(attempts, 1);
        assert!(delay.calls.is_empty());
    }

    #[test]
    fn test_delays_between_failed_attempts() {
        let mut delay = RecordingDelay::default();
        let attempts =
            retry_until(&RetryPolicy::MQTT_CONNECT, &mut delay, |n| n == 4).unwrap();

        assert_eq!(attempts, 4);
        assert_eq!(delay.calls, vec![2000, 2000, 2000]);
    }

    #[test]
    fn test_bounded_policy_exhausts() {
        let policy = RetryPolicy::bounded(Duration::from_millis(10), NonZeroU32::new(3).unwrap());
        let mut delay = RecordingDelay::default();
        let mut seen = Vec::new();

        let err = retry_until(&policy, &mut delay, |n| {
            seen.push(n);
            false
        })
        .unwrap_err();

        assert_eq!(err, RetryError::Exhausted { attempts: 3 });
        assert_eq!(seen, vec![1, 2, 3]);
        // No pause after the final attempt.
        assert_eq!(delay.calls, vec![10, 10]);
    }

    #[test]
    fn test_bounded_policy_can_still_succeed_on_last_attempt() {
        let policy = RetryPolicy::WIFI_POLL.with_max_attempts(NonZeroU32::new(2).unwrap());
        let mut delay = RecordingDelay::default();

        assert_eq!(retry_until(&policy, &mut delay, |n| n == 2), Ok(2));
        assert_eq!(delay.calls, vec![500]);
    }

    #[test]
    fn test_std_delay_sleeps() {
        let start = std::time::Instant::now();
        let mut delay = StdDelay;
        let attempts = retry_until(
            &RetryPolicy::forever(Duration::from_millis(5)),
            &mut delay,
            |n| n == 3,
        )
        .unwrap();

        assert_eq!(attempts, 3);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_cadence_fires_every_n() {
        let mut cadence = PollCadence::new(NonZeroU32::new(3).unwrap());
        let fired: Vec<bool> = (0..7).map(|_| cadence.tick()).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true, false]);
    }

    #[test]
    fn test_cadence_reset() {
        let mut cadence = PollCadence::new(NonZeroU32::new(2).unwrap());
        assert!(!cadence.tick());
        cadence.reset();
        assert!(!cadence.tick());
        assert!(cadence.tick());

        let mut every_poll = PollCadence::new(NonZeroU32::MIN);
        assert!(every_poll.tick());
        assert!(every_poll.tick());
    }

    #[test]
    fn test_interval_saturates() {
        let policy = RetryPolicy::forever(Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.interval_ms(), u32::MAX);
    }
}
