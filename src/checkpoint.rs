/// Per-site checkpoint store.
///
/// Two high-water marks per (stream, site), both local wall-clock times:
///
/// - `updates`: how far data has been confirmed fetched. Advanced only after
///   a fetch ending at that time succeeded and its lines were flushed. The
///   daily cycle starts each stream from here.
/// - `history`: how far the historical backfill has walked. Lets an
///   interrupted backfill resume at the next unfetched window instead of
///   starting over at the site's first production day.
///
/// Both marks only move forward. The file is JSON, rewritten atomically:
///
/// ```json
/// {
///   "updates": { "power": { "1234567": "2024-05-01T23:50:00" } },
///   "history": { "power": { "1234567": "2022-06-01T00:00:00" } }
/// }
/// ```
///
/// An unreadable or malformed file is fatal at load: guessing would either
/// skip data or re-fetch years of it.

use crate::model::{DataStream, Site};
use crate::persist::{self, StateFileError};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CHECKPOINT_FILE: &str = "lastupdated.json";

type Marks = BTreeMap<String, BTreeMap<String, NaiveDateTime>>;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct CheckpointFile {
    #[serde(default)]
    updates: Marks,
    #[serde(default)]
    history: Marks,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint state unusable: {0}")]
    State(#[from] StateFileError),
}

/// Initial checkpoint for a stream with no history: yesterday at the cutoff.
pub fn yesterday_at(now: NaiveDateTime, cutoff: NaiveTime) -> NaiveDateTime {
    (now.date() - Duration::days(1)).and_time(cutoff)
}

fn get_mark(marks: &Marks, stream: DataStream, site_id: &str) -> Option<NaiveDateTime> {
    marks.get(stream.name()).and_then(|sites| sites.get(site_id)).copied()
}

/// Raises the mark to `ts`; a no-op if it is already at or past it.
fn raise_mark(marks: &mut Marks, stream: DataStream, site_id: &str, ts: NaiveDateTime) -> bool {
    let slot = marks
        .entry(stream.name().to_string())
        .or_default()
        .entry(site_id.to_string())
        .or_insert(ts);
    if *slot < ts {
        *slot = ts;
        true
    } else {
        *slot == ts
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    state: CheckpointFile,
}

impl CheckpointStore {
    /// An empty store that will persist to `path`. Nothing is read.
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            state: CheckpointFile::default(),
        }
    }

    /// Reads the store at `path`, giving every (stream, site) pair without
    /// an update checkpoint the value `default`. A missing file is a first
    /// run; any other read or parse failure is an error.
    pub fn load(path: &Path, sites: &[Site], default: NaiveDateTime) -> Result<Self, CheckpointError> {
        let state = match persist::read_json::<CheckpointFile>(path)? {
            Some(state) => {
                info!(path = %path.display(), "loaded checkpoints");
                state
            }
            None => {
                info!(
                    path = %path.display(),
                    default = %default,
                    "no checkpoint file; starting from yesterday's cutoff"
                );
                CheckpointFile::default()
            }
        };

        let mut store = Self {
            path: path.to_path_buf(),
            state,
        };
        for site in sites {
            for stream in DataStream::ALL {
                if stream.applies_to(site) && store.get(stream, &site.id).is_none() {
                    debug!(site = %site.id, stream = %stream, "defaulting checkpoint");
                    store.advance(stream, &site.id, default);
                }
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time through which `stream` has been fetched for the site.
    pub fn get(&self, stream: DataStream, site_id: &str) -> Option<NaiveDateTime> {
        get_mark(&self.state.updates, stream, site_id)
    }

    /// Moves the checkpoint forward to `ts`. Returns false if the stored
    /// value was already later (the store keeps the maximum).
    pub fn advance(&mut self, stream: DataStream, site_id: &str, ts: NaiveDateTime) -> bool {
        raise_mark(&mut self.state.updates, stream, site_id, ts)
    }

    /// End of the contiguous history fetched for the site: moved by every
    /// backfill window, and by daily windows that start at or before it.
    pub fn history(&self, stream: DataStream, site_id: &str) -> Option<NaiveDateTime> {
        get_mark(&self.state.history, stream, site_id)
    }

    pub fn advance_history(&mut self, stream: DataStream, site_id: &str, ts: NaiveDateTime) -> bool {
        raise_mark(&mut self.state.history, stream, site_id, ts)
    }

    /// Writes the full store atomically.
    pub fn persist(&self) -> Result<(), CheckpointError> {
        persist::write_json_atomic(&self.path, &self.state)?;
        debug!(path = %self.path.display(), "checkpoints persisted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
