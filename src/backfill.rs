/// Historical backfill.
///
/// Walks every site's provider-reported production range, stream by stream,
/// up to where the daily updates take over:
///
/// ```text
/// siteStart ............ history mark ............ min(checkpoint, siteEnd)
///            (done)                  (remaining, split per stream span)
/// ```
///
/// All calls, including the single data-range discovery call, go through
/// one quota-metered fetcher, so a multi-year backfill spreads itself over
/// as many days as the provider's daily budget requires. Progress is
/// persisted after every window; an interrupted run resumes at the next
/// unfetched window, and a completed one makes no calls at all.

use crate::checkpoint::CheckpointStore;
use crate::clock::Clock;
use crate::ingest::DataSource;
use crate::line_protocol::MetricSink;
use crate::model::{DataStream, Site, start_of_day};
use crate::retry::RetryingFetcher;
use crate::sync::{Mark, SyncContext, SyncError};
use std::io::Write;
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BackfillReport {
    pub windows: usize,
    pub records: usize,
    /// Sites the provider reported no production range for.
    pub skipped_sites: Vec<String>,
    /// Site and stream whose fetch gave up (bounded retry policies only).
    pub abandoned: Vec<(String, DataStream)>,
}

pub struct Backfill<'a, W: Write> {
    source: &'a dyn DataSource,
    clock: &'a dyn Clock,
    sites: &'a [Site],
    store: CheckpointStore,
    sink: MetricSink<W>,
    fetcher: RetryingFetcher,
}

impl<'a, W: Write> Backfill<'a, W> {
    /// `fetcher` should carry the quota governor; the backfill is the only
    /// caller that can exhaust the daily budget.
    pub fn new(
        source: &'a dyn DataSource,
        clock: &'a dyn Clock,
        sites: &'a [Site],
        store: CheckpointStore,
        sink: MetricSink<W>,
        fetcher: RetryingFetcher,
    ) -> Self {
        Self {
            source,
            clock,
            sites,
            store,
            sink,
            fetcher,
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn sink(&self) -> &MetricSink<W> {
        &self.sink
    }

    pub fn fetcher(&self) -> &RetryingFetcher {
        &self.fetcher
    }

    /// Runs the backfill to completion.
    ///
    /// Per site in discovery order: power, energy, then equipment data. A
    /// site without a reported range is skipped; a stream that gives up
    /// abandons the rest of its site. Checkpoint and output failures abort.
    pub fn run(&mut self) -> Result<BackfillReport, SyncError> {
        info!(sites = self.sites.len(), "starting historical backfill");
        let source = self.source;
        let sites = self.sites;
        let periods = self
            .fetcher
            .call(self.clock, "data range discovery", 1, || source.data_periods(sites))
            .map_err(SyncError::Discovery)?;

        let mut report = BackfillReport::default();
        let mut ctx = SyncContext {
            source: self.source,
            clock: self.clock,
            fetcher: &mut self.fetcher,
            sink: &mut self.sink,
            store: &mut self.store,
        };

        'sites: for site in self.sites {
            let Some(period) = periods.get(&site.id) else {
                warn!(site = %site.id, "provider reports no production range; skipping site");
                report.skipped_sites.push(site.id.clone());
                continue;
            };
            let site_start = start_of_day(period.start);
            let site_end = start_of_day(period.end);
            info!(site = %site.id, start = %period.start, end = %period.end, "backfilling site");

            for stream in DataStream::BACKFILL_ORDER {
                let target_end = match ctx.store.get(stream, &site.id) {
                    Some(checkpoint) => checkpoint.min(site_end),
                    None => site_end,
                };
                let start = match ctx.store.history(stream, &site.id) {
                    Some(done) => done.max(site_start),
                    None => site_start,
                };

                match ctx.run_unit(site, stream, start, target_end, Mark::Backfill) {
                    Ok(unit) => {
                        report.windows += unit.windows;
                        report.records += unit.records;
                    }
                    Err(SyncError::Fetch { site: id, stream, source }) => {
                        error!(site = %id, stream = %stream, error = %source, "backfill abandoned for site");
                        report.abandoned.push((id, stream));
                        continue 'sites;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.sink.flush()?;
        self.store.persist()?;
        info!(
            windows = report.windows,
            records = report.records,
            attempts = self.fetcher.attempts(),
            "historical backfill complete"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
