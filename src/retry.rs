/// Retry-with-backoff wrapper around single data-source calls.
///
/// Each attempt first spends quota (one unit per network call the attempt
/// makes), then performs the call once. A failure sleeps the fixed retry
/// delay and starts over, quota included. By default there is no attempt
/// ceiling: a nightly batch would rather stall on a dead endpoint than skip
/// data. Tests and the daily cycle bound it through [`RetryPolicy`].

use crate::clock::Clock;
use crate::ingest::DataSource;
use crate::model::{DataStream, DateInterval, FetchError, MetricRecord, Site};
use crate::quota::QuotaGovernor;
use std::time::Duration;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Sleep after a failed attempt (default: 60 s).
    pub retry_delay: Duration,
    /// Sleep between consecutive successful windows of one stream (default: 1 s).
    pub pacing_delay: Duration,
    /// Attempt ceiling; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(60),
            pacing_delay: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Same delays, but give up after the first failure.
    pub fn single_attempt(&self) -> Self {
        Self {
            max_attempts: Some(1),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Drives calls under a [`RetryPolicy`], optionally metered by a
/// [`QuotaGovernor`] shared by every site and stream of one run.
#[derive(Debug)]
pub struct RetryingFetcher {
    policy: RetryPolicy,
    quota: Option<QuotaGovernor>,
    attempts: u64,
}

impl RetryingFetcher {
    pub fn new(policy: RetryPolicy, quota: Option<QuotaGovernor>) -> Self {
        Self {
            policy,
            quota,
            attempts: 0,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn quota(&self) -> Option<&QuotaGovernor> {
        self.quota.as_ref()
    }

    /// Total attempts made through this fetcher.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Runs `op` until it succeeds or the attempt ceiling is reached.
    ///
    /// `cost` is the number of network calls one attempt makes; that many
    /// quota units are consumed before every attempt.
    pub fn call<T>(
        &mut self,
        clock: &dyn Clock,
        what: &str,
        cost: u32,
        mut op: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.attempts += 1;

            if let Some(quota) = self.quota.as_mut() {
                for _ in 0..cost {
                    quota.consume(clock);
                }
                debug!(what, remaining = quota.remaining(), "quota spent");
            }

            match op() {
                Ok(value) => {
                    if attempt > 1 {
                        info!(what, attempt, "succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if self.policy.max_attempts.is_some_and(|max| attempt >= max) {
                        warn!(what, attempt, error = %err, "giving up");
                        return Err(err);
                    }
                    warn!(
                        what,
                        attempt,
                        retry_in_secs = self.policy.retry_delay.as_secs(),
                        error = %err,
                        "fetch failed; retrying"
                    );
                    clock.sleep(self.policy.retry_delay);
                }
            }
        }
    }

    /// Fetches one window of one stream for one site, with retries.
    pub fn fetch(
        &mut self,
        source: &dyn DataSource,
        clock: &dyn Clock,
        site: &Site,
        stream: DataStream,
        window: &DateInterval,
    ) -> Result<Vec<MetricRecord>, FetchError> {
        let what = format!("{} site {} {}", stream, site.id, window);
        let cost = source.calls_per_fetch(site, stream);
        self.call(clock, &what, cost, || source.fetch(site, stream, window))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
