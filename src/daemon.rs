/// Daily update scheduler.
///
/// Runs the update cycle once per day at a fixed local cutoff (default
/// 23:50, after sunset, so the day's production is complete):
/// 1. Computes the next cutoff strictly after `now`
/// 2. Sleeps until then
/// 3. For each site in discovery order and each stream, fetches
///    `[checkpoint, cutoff)` with a single attempt (failures are logged and
///    picked up again by the next cycle, since their checkpoint stays put)
/// 4. Flushes the output and persists the checkpoints
///
/// The wait is recomputed from the wall clock every iteration, so a sleep
/// that over- or undershoots (suspend, DST change) corrects itself the next
/// day. The daily cycle makes a handful of calls and bypasses the quota
/// governor.

use crate::checkpoint::CheckpointStore;
use crate::clock::Clock;
use crate::ingest::DataSource;
use crate::line_protocol::MetricSink;
use crate::model::{DataStream, Site};
use crate::retry::{RetryPolicy, RetryingFetcher};
use crate::sync::{Mark, SyncContext, SyncError};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use std::io::Write;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Cycle time used when none is configured.
pub const DEFAULT_CUTOFF: NaiveTime = match NaiveTime::from_hms_opt(23, 50, 0) {
    Some(time) => time,
    None => panic!("23:50 is a time of day"),
};

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    /// Local time of day the update cycle runs at (default: 23:50).
    pub cutoff: NaiveTime,
    /// Delays used by the cycle; the attempt ceiling is forced to one.
    pub retry: RetryPolicy,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_CUTOFF,
            retry: RetryPolicy::default(),
        }
    }
}

/// How long the daemon keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One cycle right away, then return (operator diagnostics).
    OneShot,
    /// A cycle at every cutoff, forever.
    Continuous,
}

/// First cutoff strictly after `now`.
pub fn next_cutoff(now: NaiveDateTime, cutoff: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(cutoff);
    if today > now { today } else { today + Duration::days(1) }
}

/// End of a one-shot cycle: today's cutoff once it has passed, otherwise
/// `now`, so a diagnostic run never claims data from the future.
pub fn one_shot_end(now: NaiveDateTime, cutoff: NaiveTime) -> NaiveDateTime {
    now.min(now.date().and_time(cutoff))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub succeeded: usize,
    pub failed: usize,
    pub records: usize,
}

// ---------------------------------------------------------------------------
// Daemon State
// ---------------------------------------------------------------------------

pub struct Daemon<'a, W: Write> {
    config: DaemonConfig,
    source: &'a dyn DataSource,
    clock: &'a dyn Clock,
    sites: &'a [Site],
    store: CheckpointStore,
    sink: MetricSink<W>,
    fetcher: RetryingFetcher,
    cycles: u64,
}

impl<'a, W: Write> Daemon<'a, W> {
    pub fn new(
        config: DaemonConfig,
        source: &'a dyn DataSource,
        clock: &'a dyn Clock,
        sites: &'a [Site],
        store: CheckpointStore,
        sink: MetricSink<W>,
    ) -> Self {
        let fetcher = RetryingFetcher::new(config.retry.single_attempt(), None);
        Self {
            config,
            source,
            clock,
            sites,
            store,
            sink,
            fetcher,
            cycles: 0,
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn sink(&self) -> &MetricSink<W> {
        &self.sink
    }

    /// Completed update cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Fetches every stream of every site up to `end`, then persists.
    ///
    /// Fetch failures are logged and counted; only checkpoint or output
    /// failures abort the cycle.
    pub fn run_cycle(&mut self, end: NaiveDateTime) -> Result<CycleReport, SyncError> {
        info!(end = %end, sites = self.sites.len(), "update cycle starting");
        let mut report = CycleReport::default();
        let mut ctx = SyncContext {
            source: self.source,
            clock: self.clock,
            fetcher: &mut self.fetcher,
            sink: &mut self.sink,
            store: &mut self.store,
        };

        for site in self.sites {
            for stream in DataStream::ALL {
                if !stream.applies_to(site) {
                    continue;
                }
                let Some(start) = ctx.store.get(stream, &site.id) else {
                    warn!(site = %site.id, stream = %stream, "no checkpoint; skipped");
                    continue;
                };
                match ctx.run_unit(site, stream, start, end, Mark::Update) {
                    Ok(unit) => {
                        report.succeeded += 1;
                        report.records += unit.records;
                    }
                    Err(SyncError::Fetch { site: id, stream, source }) => {
                        warn!(site = %id, stream = %stream, error = %source, "update failed; retrying next cycle");
                        report.failed += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.sink.flush()?;
        self.store.persist()?;
        self.cycles += 1;
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            records = report.records,
            "update cycle complete"
        );
        Ok(report)
    }

    /// Sleeps until the next cutoff, then runs one cycle ending there.
    pub fn step(&mut self) -> Result<CycleReport, SyncError> {
        let now = self.clock.now();
        let due = next_cutoff(now, self.config.cutoff);
        info!(next_update = %due, wait_secs = (due - now).num_seconds(), "sleeping until cutoff");
        self.clock.sleep_until(due);
        self.run_cycle(due)
    }

    /// Runs according to `mode`. In continuous mode this only returns on a
    /// fatal error.
    pub fn run(&mut self, mode: RunMode) -> Result<(), SyncError> {
        match mode {
            RunMode::OneShot => {
                let end = one_shot_end(self.clock.now(), self.config.cutoff);
                self.run_cycle(end)?;
                Ok(())
            }
            RunMode::Continuous => {
                info!(cutoff = %self.config.cutoff, sites = self.sites.len(), "starting daily update loop");
                loop {
                    self.step()?;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
