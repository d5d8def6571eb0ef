/// The per-(site, stream) unit of work shared by the backfill and the daily
/// cycle.
///
/// A unit covers `[start, end)`: it plans span-limited windows, then for
/// each window in order fetches (through the retrying fetcher), emits and
/// flushes the records, and only then advances the checkpoint. A crash
/// between flush and checkpoint replays the window on the next run, so
/// delivery is at-least-once.
///
/// ```text
/// Pending -> Fetching -> Succeeded -> checkpoint advanced -> next window
///               ^   \
///               |    Failed -> retry wait
///               +-----------------+
/// ```
///
/// The unit is done when no windows remain, i.e. the checkpoint (or, for
/// the backfill, the history mark) is already at or past `end`.

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::clock::Clock;
use crate::ingest::DataSource;
use crate::intervals::plan_windows;
use crate::line_protocol::MetricSink;
use crate::model::{DataStream, FetchError, Site};
use crate::retry::RetryingFetcher;
use chrono::NaiveDateTime;
use std::io::{self, Write};
use tracing::{debug, info};

/// Which marks a successful window moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// Daily cycle: the update checkpoint, persisted once per cycle. The
    /// history mark follows along only when it already reaches the window,
    /// so a finished backfill stays finished as the daily cycle moves on.
    Update,
    /// Backfill: the update checkpoint and the history mark, persisted after
    /// every window.
    Backfill,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnitReport {
    pub windows: usize,
    pub records: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{stream} fetch for site {site} failed: {source}")]
    Fetch {
        site: String,
        stream: DataStream,
        #[source]
        source: FetchError,
    },
    #[error("data range discovery failed: {0}")]
    Discovery(#[source] FetchError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("cannot write metrics: {0}")]
    Output(#[from] io::Error),
}

/// Owned run state threaded through every unit of work.
pub struct SyncContext<'a, W: Write> {
    pub source: &'a dyn DataSource,
    pub clock: &'a dyn Clock,
    pub fetcher: &'a mut RetryingFetcher,
    pub sink: &'a mut MetricSink<W>,
    pub store: &'a mut CheckpointStore,
}

impl<W: Write> SyncContext<'_, W> {
    /// Fetches `stream` for `site` over `[start, end)`, window by window.
    ///
    /// Stops at the first window whose fetch fails for good (only possible
    /// with a bounded retry policy); earlier windows stay committed.
    pub fn run_unit(
        &mut self,
        site: &Site,
        stream: DataStream,
        start: NaiveDateTime,
        end: NaiveDateTime,
        mark: Mark,
    ) -> Result<UnitReport, SyncError> {
        let windows = plan_windows(start, end, stream.max_span_days());
        if windows.is_empty() {
            debug!(site = %site.id, stream = %stream, "up to date");
            return Ok(UnitReport::default());
        }
        debug!(site = %site.id, stream = %stream, windows = windows.len(), %start, %end, "planned");

        let mut report = UnitReport::default();
        for (i, window) in windows.iter().enumerate() {
            if i > 0 {
                self.clock.sleep(self.fetcher.policy().pacing_delay);
            }

            let records = self
                .fetcher
                .fetch(self.source, self.clock, site, stream, window)
                .map_err(|source| SyncError::Fetch {
                    site: site.id.clone(),
                    stream,
                    source,
                })?;

            self.sink.emit(&records)?;
            self.sink.flush()?;

            self.store.advance(stream, &site.id, window.end);
            match mark {
                Mark::Backfill => {
                    self.store.advance_history(stream, &site.id, window.end);
                    self.store.persist()?;
                }
                Mark::Update => {
                    if self.store.history(stream, &site.id).is_some_and(|h| h >= window.start) {
                        self.store.advance_history(stream, &site.id, window.end);
                    }
                }
            }

            report.windows += 1;
            report.records += records.len();
            info!(
                site = %site.id,
                stream = %stream,
                window = %window,
                records = records.len(),
                "window done"
            );
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
