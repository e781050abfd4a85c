//! Wall-clock synchronisation.
//!
//! TLS certificate validation during OTA needs a sane wall clock. The node
//! boots at the Unix epoch, so [`set_clock`] starts SNTP and blocks until
//! the time reads past a threshold.

use crate::config::SntpConfig;
use crate::link::SntpClock;
use crate::retry::{retry_until, Delay, RetryError, RetryPolicy};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("no SNTP servers configured")]
    NoServers,

    #[error("clock not synchronised after {attempts} reads")]
    NotSynchronised { attempts: u32 },
}

/// Start SNTP and wait until the clock is set.
///
/// Polls `clock.now()` at `policy.interval` until it reads at or after
/// `config.min_valid_epoch_secs`. Returns the synchronised time.
pub fn set_clock<C, D>(
    clock: &mut C,
    delay: &mut D,
    config: &SntpConfig,
    policy: &RetryPolicy,
) -> Result<DateTime<Utc>, ClockError>
where
    C: SntpClock + ?Sized,
    D: Delay + ?Sized,
{
    if config.servers.is_empty() {
        return Err(ClockError::NoServers);
    }

    info!("Waiting for SNTP time sync ({})", config.servers.join(", "));
    clock.start_sync(&config.servers);

    let mut synced = None;
    retry_until(policy, delay, |attempt| {
        let now = clock.now();
        if now.timestamp() >= config.min_valid_epoch_secs {
            synced = Some(now);
            true
        } else {
            debug!(attempt, timestamp = now.timestamp(), "Clock not set yet");
            false
        }
    })
    .map_err(|RetryError::Exhausted { attempts }| {
        warn!(attempts, "Giving up on SNTP");
        ClockError::NotSynchronised { attempts }
    })?;

    let now = synced.ok_or(ClockError::NotSynchronised { attempts: 0 })?;
    info!("Current time: {}", now.to_rfc3339());
    Ok(now)
}
