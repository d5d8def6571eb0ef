/// Date-range partitioning for span-limited API calls.
///
/// The provider rejects calls whose date range exceeds a per-endpoint
/// maximum (28 days for power/energy, 7 days for equipment data). Long
/// ranges are cut into consecutive inclusive day ranges: a range ending on
/// day D is followed by one starting on day D+1, so no day is fetched twice
/// and none is skipped.

use crate::model::{DateInterval, DayRange};
use chrono::{Duration, NaiveDateTime};

/// Splits the inclusive day range `[first, last]` into consecutive ranges.
///
/// Every range but the last spans exactly `max_span` days of difference
/// (`max_span + 1` calendar days); the last one holds the remainder, at most
/// `max_span` days of difference. A range whose difference is at most
/// `max_span` days is returned unchanged.
///
/// Returns an empty vector when `last < first`. Negative `max_span` values
/// are treated as zero (one calendar day per range).
pub fn split_days(first: chrono::NaiveDate, last: chrono::NaiveDate, max_span: i64) -> Vec<DayRange> {
    if last < first {
        return Vec::new();
    }
    let max_span = max_span.max(0);

    let mut ranges = Vec::new();
    let mut days = (last - first).num_days();
    let mut prev = first;
    loop {
        if days <= max_span {
            ranges.push(DayRange { first: prev, last: prev + Duration::days(days) });
            break;
        }
        // +1: the next range starts the day after this one ends.
        days -= max_span + 1;
        let next = prev + Duration::days(max_span);
        ranges.push(DayRange { first: prev, last: next });
        prev = next + Duration::days(1);
    }
    ranges
}

/// Plans the fetch windows covering `[start, end)` for a stream whose calls
/// may span at most `max_span` days (`None`: no limit, one window).
///
/// Each window covers `max_span` whole calendar days, so its duration never
/// exceeds `max_span * 24h`: the days come from [`split_days`] with a
/// difference of `max_span - 1` and are clamped to `[start, end)`. Empty
/// windows are dropped, so `start >= end` yields no windows at all.
pub fn plan_windows(start: NaiveDateTime, end: NaiveDateTime, max_span: Option<i64>) -> Vec<DateInterval> {
    if start >= end {
        return Vec::new();
    }
    let Some(span) = max_span else {
        return vec![DateInterval::new(start, end)];
    };

    split_days(start.date(), end.date(), span.max(1) - 1)
        .into_iter()
        .map(|range| DateInterval::covering(range, start, end))
        .filter(|w| !w.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn assert_contiguous(ranges: &[DayRange], first: NaiveDate, last: NaiveDate) {
        assert_eq!(ranges.first().map(|r| r.first), Some(first), "must start at range start");
        assert_eq!(ranges.last().map(|r| r.last), Some(last), "must end at range end");
        for pair in ranges.windows(2) {
            assert_eq!(
                pair[1].first,
                pair[0].last + Duration::days(1),
                "next range must start the day after {:?}",
                pair[0]
            );
        }
        let covered: i64 = ranges.iter().map(DayRange::days).sum();
        assert_eq!(covered, (last - first).num_days() + 1, "every day counted exactly once");
    }

    #[test]
    fn test_short_range_is_returned_unchanged() {
        let ranges = split_days(d(2024, 5, 1), d(2024, 5, 20), 28);
        assert_eq!(ranges, vec![DayRange { first: d(2024, 5, 1), last: d(2024, 5, 20) }]);
    }

    #[test]
    fn test_single_day_range() {
        let ranges = split_days(d(2024, 5, 1), d(2024, 5, 1), 7);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].days(), 1);
    }

    #[test]
    fn test_inverted_range_yields_nothing() {
        assert!(split_days(d(2024, 5, 2), d(2024, 5, 1), 7).is_empty());
    }

    #[test]
    fn test_quarter_split_into_28_day_ranges() {
        let ranges = split_days(d(2023, 1, 1), d(2023, 4, 10), 28);
        assert_eq!(ranges[0], DayRange { first: d(2023, 1, 1), last: d(2023, 1, 29) });
        assert_eq!(ranges[1].first, d(2023, 1, 30));
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[3], DayRange { first: d(2023, 3, 29), last: d(2023, 4, 10) });
        assert_contiguous(&ranges, d(2023, 1, 1), d(2023, 4, 10));
    }

    #[test]
    fn test_half_year_needs_six_calls() {
        // 2022-01-01 .. 2022-06-01 is 152 calendar days: ceil(152 / 29) = 6.
        let ranges = split_days(d(2022, 1, 1), d(2022, 6, 1), 28);
        assert_eq!(ranges.len(), 6);
        assert_eq!(ranges[5], DayRange { first: d(2022, 5, 26), last: d(2022, 6, 1) });
        assert_contiguous(&ranges, d(2022, 1, 1), d(2022, 6, 1));
    }

    #[test]
    fn test_range_of_exactly_max_span_is_not_split() {
        let ranges = split_days(d(2024, 5, 1), d(2024, 5, 29), 28);
        assert_eq!(ranges.len(), 1);
        let ranges = split_days(d(2024, 5, 1), d(2024, 5, 30), 28);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1], DayRange { first: d(2024, 5, 30), last: d(2024, 5, 30) });
    }

    #[test]
    fn test_property_contiguous_for_many_inputs() {
        let start = d(2020, 2, 27);
        for len in 0..120 {
            for span in [0, 1, 2, 7, 28] {
                let end = start + Duration::days(len);
                let ranges = split_days(start, end, span);
                assert_contiguous(&ranges, start, end);
                for r in &ranges {
                    assert!((r.last - r.first).num_days() <= span, "range {:?} exceeds span {}", r, span);
                    assert!(r.days() <= span + 1, "range {:?} exceeds span {}", r, span);
                }
                // Every range but the last is full, so the count is exact.
                let expected_calls = ((len + 1 + span) / (span + 1)) as usize;
                assert_eq!(ranges.len(), expected_calls, "len {} span {}", len, span);
            }
        }
    }

    #[test]
    fn test_negative_span_gives_single_days() {
        let ranges = split_days(d(2024, 1, 1), d(2024, 1, 10), -3);
        assert_eq!(ranges.len(), 10);
        assert!(ranges.iter().all(|r| r.days() == 1));
        assert_contiguous(&ranges, d(2024, 1, 1), d(2024, 1, 10));
    }

    #[test]
    fn test_plan_windows_incremental_day() {
        let windows = plan_windows(dt("2024-05-01 23:50:00"), dt("2024-05-02 23:50:00"), Some(28));
        assert_eq!(windows, vec![DateInterval::new(dt("2024-05-01 23:50:00"), dt("2024-05-02 23:50:00"))]);
    }

    #[test]
    fn test_plan_windows_unbounded_stream_is_single_window() {
        let windows = plan_windows(dt("2024-04-01 23:50:00"), dt("2024-05-02 23:50:00"), None);
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn test_plan_windows_empty_when_caught_up() {
        assert!(plan_windows(dt("2024-05-02 23:50:00"), dt("2024-05-02 23:50:00"), Some(7)).is_empty());
        assert!(plan_windows(dt("2024-05-03 00:00:00"), dt("2024-05-02 23:50:00"), Some(7)).is_empty());
    }

    #[test]
    fn test_plan_windows_are_gap_free() {
        let start = dt("2022-01-01 00:00:00");
        let end = dt("2022-06-01 00:00:00");
        let windows = plan_windows(start, end, Some(28));
        assert_eq!(windows.len(), 6);
        assert_eq!(windows[0].start, start);
        assert_eq!(windows[5].end, end);
        assert_eq!(windows[1], DateInterval::new(dt("2022-01-29 00:00:00"), dt("2022-02-26 00:00:00")));
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "windows must abut");
        }
    }

    #[test]
    fn test_plan_windows_never_exceed_max_span() {
        let starts = [dt("2024-01-01 00:00:00"), dt("2024-03-22 23:50:00"), dt("2024-02-28 12:00:00")];
        for start in starts {
            for len in 1..70 {
                let end = start + Duration::days(len) + Duration::minutes(17);
                for span in [1, 7, 28] {
                    let windows = plan_windows(start, end, Some(span));
                    assert_eq!(windows.first().map(|w| w.start), Some(start));
                    assert_eq!(windows.last().map(|w| w.end), Some(end));
                    for w in &windows {
                        assert!(
                            w.end - w.start <= Duration::days(span),
                            "window {} exceeds {} days",
                            w,
                            span
                        );
                    }
                    for pair in windows.windows(2) {
                        assert_eq!(pair[0].end, pair[1].start, "windows must abut");
                    }
                }
            }
        }
    }

    #[test]
    fn test_plan_windows_week_is_seven_days() {
        let windows = plan_windows(dt("2024-01-01 00:00:00"), dt("2024-01-31 00:00:00"), Some(7));
        assert_eq!(windows[0], DateInterval::new(dt("2024-01-01 00:00:00"), dt("2024-01-08 00:00:00")));
        assert_eq!(windows[1].start, dt("2024-01-08 00:00:00"));
        assert_eq!(windows.len(), 5);
    }
}
