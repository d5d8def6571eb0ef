//! Shared helpers for the engine-level integration tests: an in-memory
//! provider that records every call and can be told to fail.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use solmon_service::ingest::{DataSource, SitePeriod};
use solmon_service::line_protocol::MetricSink;
use solmon_service::model::{DataStream, DateInterval, Dimension, FetchError, MetricRecord, Site};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

pub fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn site(id: &str, has_optimizers: bool) -> Site {
    Site {
        id: id.to_string(),
        time_zone: chrono_tz::UTC,
        serials: vec![format!("SN-{}", id)],
        has_optimizers,
    }
}

/// Everything written to a sink so far, one entry per line.
pub fn lines(sink: &MetricSink<Vec<u8>>) -> Vec<String> {
    String::from_utf8(sink.get_ref().clone())
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

pub struct FakeProvider {
    periods: HashMap<String, SitePeriod>,
    calls: RefCell<Vec<(String, DataStream, DateInterval)>>,
    /// 1-based fetch numbers that fail.
    failing_calls: RefCell<Vec<usize>>,
    /// Streams that fail on every call.
    down: RefCell<Vec<DataStream>>,
    period_queries: Cell<usize>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            periods: HashMap::new(),
            calls: RefCell::new(Vec::new()),
            failing_calls: RefCell::new(Vec::new()),
            down: RefCell::new(Vec::new()),
            period_queries: Cell::new(0),
        }
    }

    pub fn with_period(mut self, site_id: &str, start: &str, end: &str) -> Self {
        self.periods.insert(
            site_id.to_string(),
            SitePeriod {
                start: date(start),
                end: date(end),
            },
        );
        self
    }

    pub fn fail_calls(&self, numbers: &[usize]) {
        self.failing_calls.borrow_mut().extend_from_slice(numbers);
    }

    pub fn set_down(&self, stream: DataStream, down: bool) {
        let mut streams = self.down.borrow_mut();
        streams.retain(|s| *s != stream);
        if down {
            streams.push(stream);
        }
    }

    pub fn calls(&self) -> Vec<(String, DataStream, DateInterval)> {
        self.calls.borrow().clone()
    }

    pub fn windows(&self, stream: DataStream) -> Vec<DateInterval> {
        self.calls
            .borrow()
            .iter()
            .filter(|(_, s, _)| *s == stream)
            .map(|(_, _, w)| *w)
            .collect()
    }

    pub fn period_queries(&self) -> usize {
        self.period_queries.get()
    }

    pub fn reset_calls(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl DataSource for FakeProvider {
    /// One production reading at the window start.
    fn fetch(&self, site: &Site, stream: DataStream, window: &DateInterval) -> Result<Vec<MetricRecord>, FetchError> {
        self.calls.borrow_mut().push((site.id.clone(), stream, *window));
        let n = self.calls.borrow().len();
        if self.failing_calls.borrow().contains(&n) || self.down.borrow().contains(&stream) {
            return Err(FetchError::Http {
                status: 503,
                url: format!("/site/{}/{}", site.id, stream),
            });
        }
        let ts = site.local_to_unix_nanos(window.start).unwrap_or_default();
        Ok(vec![MetricRecord::single(
            stream.measurement(),
            &site.id,
            Some(Dimension { key: "type", value: "production".to_string() }),
            "w",
            100.0,
            ts,
        )])
    }

    fn data_periods(&self, _sites: &[Site]) -> Result<HashMap<String, SitePeriod>, FetchError> {
        self.period_queries.set(self.period_queries.get() + 1);
        Ok(self.periods.clone())
    }
}
