/// Daily API-call budget for the historical backfill.
///
/// The monitoring API allows 300 calls per day per account. A backfill of a
/// multi-year history needs far more than that, so the governor counts calls
/// and, once the budget is spent, parks the thread until the next local
/// midnight when the provider resets the counter.

use crate::clock::Clock;
use crate::model::start_of_day;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{info, warn};

/// Default daily budget: provider limit of 300 minus a safety margin.
pub const DEFAULT_DAILY_CALL_LIMIT: u32 = 280;

#[derive(Debug, Clone)]
pub struct QuotaGovernor {
    daily_limit: u32,
    remaining: u32,
    /// Local day the current budget belongs to.
    period: Option<NaiveDate>,
}

impl QuotaGovernor {
    /// Creates a governor with the full budget available. A zero limit is
    /// raised to one so `consume` always makes progress.
    pub fn new(daily_limit: u32) -> Self {
        let daily_limit = daily_limit.max(1);
        Self {
            daily_limit,
            remaining: daily_limit,
            period: None,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Calls still permitted before the next reset.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Spends one call. When the budget is already spent, blocks until the
    /// next local midnight and restores the full budget first. A budget left
    /// over from an earlier day is restored without waiting.
    ///
    /// No cancellation: the only way out of the wait is process termination.
    pub fn consume(&mut self, clock: &dyn Clock) {
        let now = clock.now();
        if self.period.is_some_and(|day| day < now.date()) {
            self.remaining = self.daily_limit;
        }
        self.period = Some(now.date());

        if self.remaining == 0 {
            let reset = next_midnight(now);
            warn!(
                limit = self.daily_limit,
                resume_at = %reset.format("%Y-%m-%d %H:%M:%S"),
                "daily API quota spent, waiting for reset"
            );
            clock.sleep_until(reset);
            self.remaining = self.daily_limit;
            self.period = Some(clock.now().date());
            info!(limit = self.daily_limit, "daily API quota reset");
        }
        self.remaining -= 1;
    }
}

/// First local midnight strictly after `now`.
pub fn next_midnight(now: NaiveDateTime) -> NaiveDateTime {
    start_of_day(now.date() + Duration::days(1))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
