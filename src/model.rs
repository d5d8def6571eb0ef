/// Core data types for the solar monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// sites, data streams, fetch windows, emitted metric records and the
/// transient fetch error. It performs no I/O.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Sites
// ---------------------------------------------------------------------------

/// A monitored installation, as discovered from the provider account.
///
/// Immutable after discovery; persisted in the installation cache so later
/// starts do not spend API calls rediscovering it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Provider site id (opaque; numeric in practice).
    pub id: String,
    /// IANA time zone the provider reports local timestamps in.
    pub time_zone: Tz,
    /// Inverter serial numbers, in inventory order.
    pub serials: Vec<String>,
    /// True when the site has panel optimizers (sub-device telemetry).
    pub has_optimizers: bool,
}

impl Site {
    /// Converts a provider wall-clock timestamp in this site's time zone to
    /// nanoseconds since the unix epoch.
    ///
    /// Ambiguous local times (DST fall-back) resolve to the earlier instant;
    /// nonexistent local times (spring-forward gap) yield `None`.
    pub fn local_to_unix_nanos(&self, local: NaiveDateTime) -> Option<i64> {
        self.time_zone
            .from_local_datetime(&local)
            .earliest()
            .and_then(|dt| dt.timestamp_nanos_opt())
    }
}

// ---------------------------------------------------------------------------
// Data streams
// ---------------------------------------------------------------------------

/// A distinct category of telemetry, each with its own per-call span limit
/// and its own checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataStream {
    Power,
    Energy,
    EquipmentData,
    PanelPlayback,
}

impl DataStream {
    /// Every stream, in daily-cycle order.
    pub const ALL: [DataStream; 4] = [
        DataStream::Power,
        DataStream::Energy,
        DataStream::EquipmentData,
        DataStream::PanelPlayback,
    ];

    /// Streams walked by the historical backfill, in resume order.
    /// Panel playback is excluded: the web endpoint only serves the last week.
    pub const BACKFILL_ORDER: [DataStream; 3] = [
        DataStream::Power,
        DataStream::Energy,
        DataStream::EquipmentData,
    ];

    /// Stable name used in logs and in the checkpoint file.
    pub fn name(self) -> &'static str {
        match self {
            DataStream::Power => "power",
            DataStream::Energy => "energy",
            DataStream::EquipmentData => "equipment-data",
            DataStream::PanelPlayback => "panel-playback",
        }
    }

    /// Measurement name written to the metric sink.
    pub fn measurement(self) -> &'static str {
        match self {
            DataStream::Power => "power",
            DataStream::Energy => "energy",
            DataStream::EquipmentData => "inverter",
            DataStream::PanelPlayback => "panel",
        }
    }

    /// Maximum span of a single fetch call in days, or `None` when the
    /// provider decides the window itself.
    pub fn max_span_days(self) -> Option<i64> {
        match self {
            // The API documents "one month"; in practice 28 days is accepted.
            DataStream::Power | DataStream::Energy => Some(28),
            DataStream::EquipmentData => Some(7),
            DataStream::PanelPlayback => None,
        }
    }

    /// Whether this stream exists for the given site at all.
    pub fn applies_to(self, site: &Site) -> bool {
        match self {
            DataStream::PanelPlayback => site.has_optimizers,
            _ => true,
        }
    }
}

impl fmt::Display for DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Time windows
// ---------------------------------------------------------------------------

/// Inclusive calendar-day range produced by the interval splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DayRange {
    /// Number of calendar days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.last - self.first).num_days() + 1
    }
}

/// Window `[start, end)` bounding a single fetch call, in site-local wall time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateInterval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Clamps a day range to `[lower, upper)`: the window starts at the first
    /// day's midnight and ends at the midnight after the last day.
    pub fn covering(range: DayRange, lower: NaiveDateTime, upper: NaiveDateTime) -> Self {
        let day_start = start_of_day(range.first);
        let day_end = start_of_day(range.last + chrono::Duration::days(1));
        Self {
            start: day_start.max(lower),
            end: day_end.min(upper),
        }
    }
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} .. {})",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Midnight at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

// ---------------------------------------------------------------------------
// Metric records
// ---------------------------------------------------------------------------

/// Optional tag refining a record below the site: meter type, inverter
/// serial or panel id.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub key: &'static str,
    pub value: String,
}

/// One emitted observation. Write-only: nothing downstream is owned here.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub measurement: &'static str,
    pub site_id: String,
    pub dimension: Option<Dimension>,
    /// Field name → numeric value, in emission order. Never empty.
    pub fields: Vec<(String, f64)>,
    /// Nanoseconds since the unix epoch.
    pub timestamp_ns: i64,
}

impl MetricRecord {
    /// Single-field record, the shape used by the power, energy and panel streams.
    pub fn single(
        measurement: &'static str,
        site_id: &str,
        dimension: Option<Dimension>,
        field: &str,
        value: f64,
        timestamp_ns: i64,
    ) -> Self {
        Self {
            measurement,
            site_id: site_id.to_string(),
            dimension,
            fields: vec![(field.to_string(), value)],
            timestamp_ns,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Transient failure of a single data-source call. Always retryable.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Non-2xx HTTP response. `url` never carries the API key.
    #[error("HTTP {status} : {url}")]
    Http { status: u16, url: String },
    /// Connection, TLS or timeout failure.
    #[error("network error: {0}")]
    Network(String),
    /// The response body could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// The call needs configuration that is not present (e.g. web credentials).
    #[error("not configured: {0}")]
    NotConfigured(String),
    /// Local I/O around the call failed (cookie cache).
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL carries the API key as a query parameter.
        FetchError::Network(e.without_url().to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn site(tz: Tz) -> Site {
        Site {
            id: "1234".to_string(),
            time_zone: tz,
            serials: vec!["7E123456-AB".to_string()],
            has_optimizers: false,
        }
    }

    #[test]
    fn test_stream_span_limits() {
        assert_eq!(DataStream::Power.max_span_days(), Some(28));
        assert_eq!(DataStream::Energy.max_span_days(), Some(28));
        assert_eq!(DataStream::EquipmentData.max_span_days(), Some(7));
        assert_eq!(DataStream::PanelPlayback.max_span_days(), None);
    }

    #[test]
    fn test_stream_names_are_kebab_case_in_serde() {
        let json = serde_json::to_string(&DataStream::EquipmentData).unwrap();
        assert_eq!(json, "\"equipment-data\"");
        assert_eq!(DataStream::PanelPlayback.to_string(), "panel-playback");
    }

    #[test]
    fn test_playback_only_applies_to_optimizer_sites() {
        let mut s = site(chrono_tz::Europe::Brussels);
        assert!(!DataStream::PanelPlayback.applies_to(&s));
        assert!(DataStream::Power.applies_to(&s));
        s.has_optimizers = true;
        assert!(DataStream::PanelPlayback.applies_to(&s));
    }

    #[test]
    fn test_local_to_unix_nanos_uses_site_zone() {
        let utc = site(chrono_tz::UTC);
        let brussels = site(chrono_tz::Europe::Brussels);
        let local = dt("2022-01-01 12:00:00");

        assert_eq!(utc.local_to_unix_nanos(local), Some(1_641_038_400_000_000_000));
        // Brussels is UTC+1 in winter.
        assert_eq!(
            brussels.local_to_unix_nanos(local),
            Some(1_641_038_400_000_000_000 - 3_600_000_000_000)
        );
    }

    #[test]
    fn test_local_to_unix_nanos_skips_dst_gap() {
        let brussels = site(chrono_tz::Europe::Brussels);
        // 2022-03-27 02:30 does not exist in Brussels.
        assert_eq!(brussels.local_to_unix_nanos(dt("2022-03-27 02:30:00")), None);
    }

    #[test]
    fn test_window_covering_clamps_to_bounds() {
        let range = DayRange {
            first: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            last: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        };
        let window = DateInterval::covering(range, dt("2024-05-01 23:50:00"), dt("2024-05-02 23:50:00"));
        assert_eq!(window.start, dt("2024-05-01 23:50:00"));
        assert_eq!(window.end, dt("2024-05-02 23:50:00"));

        let open = DateInterval::covering(range, dt("2024-04-01 00:00:00"), dt("2024-06-01 00:00:00"));
        assert_eq!(open.start, dt("2024-05-01 00:00:00"));
        assert_eq!(open.end, dt("2024-05-03 00:00:00"));
        assert_eq!(range.days(), 2);
    }

    #[test]
    fn test_fetch_error_display_is_operator_readable() {
        let e = FetchError::Http {
            status: 429,
            url: "https://monitoringapi.solaredge.com/site/1/powerDetails.json".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "HTTP 429 : https://monitoringapi.solaredge.com/site/1/powerDetails.json"
        );
    }
}
