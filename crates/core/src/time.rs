use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{Result, WattError};

const SECS_PER_DAY: i64 = 86_400;

/// Accepts RFC3339 or a bare `YYYY-MM-DD`, read as UTC midnight.
pub fn parse_time_or_date(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }

    Err(WattError::Parse(format!(
        "expected RFC3339 time or YYYY-MM-DD date, got {input}"
    )))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| WattError::Parse(format!("invalid duration {input}: {e}")))
}

/// Renders a duration the way the metrics store's query language expects, e.g. `30d`.
pub fn promql_duration(d: Duration) -> String {
    let secs = d.as_secs().max(1);
    if secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

pub fn date_start_ts(date: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .timestamp()
}

pub fn format_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

/// Splits `[start, end]` into inclusive, non-overlapping windows of `days` days.
#[derive(Debug, Clone)]
pub struct TimeChunks {
    next: i64,
    end: i64,
    span: i64,
}

pub fn time_chunks(start: i64, end: i64, days: u32) -> TimeChunks {
    TimeChunks {
        next: start,
        end,
        span: i64::from(days.max(1)) * SECS_PER_DAY - 1,
    }
}

impl Iterator for TimeChunks {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let chunk_end = (self.next + self.span).min(self.end);
        let chunk = (self.next, chunk_end);
        self.next = chunk_end + 1;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339() {
        let ts = parse_time_or_date("2025-01-31T23:59:59+00:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-31T23:59:59+00:00");
    }

    #[test]
    fn parses_bare_date_as_utc_midnight() {
        let ts = parse_time_or_date("2021-09-18").unwrap();
        assert_eq!(ts.timestamp(), 1_631_923_200);
    }

    #[test]
    fn rejects_invalid() {
        assert!(parse_time_or_date("yesterday").is_err());
        assert!(parse_duration_str("soon").is_err());
    }

    #[test]
    fn promql_durations() {
        assert_eq!(promql_duration(Duration::from_secs(30 * 86_400)), "30d");
        assert_eq!(promql_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(promql_duration(Duration::from_secs(300)), "5m");
        assert_eq!(promql_duration(Duration::from_secs(45)), "45s");
        assert_eq!(promql_duration(Duration::ZERO), "1s");
    }

    #[test]
    fn chunks_cover_range_without_overlap() {
        let start = 1_000_000;
        let end = start + 20 * SECS_PER_DAY;
        let chunks: Vec<_> = time_chunks(start, end, 7).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], (start, start + 7 * SECS_PER_DAY - 1));
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].0, pair[0].1 + 1);
        }
        assert_eq!(chunks.last().unwrap().1, end);
    }

    #[test]
    fn empty_range_yields_nothing() {
        assert_eq!(time_chunks(10, 10, 7).count(), 0);
        assert_eq!(time_chunks(20, 10, 7).count(), 0);
    }
}
