// crates/opx-core/src/time.rs
// ============================================================================
// Module: Timestamps & Calendar Windows
// Description: UTC RFC 3339 millisecond timestamps and deterministic
// calendar-bounded windows for automation jobs.
// Purpose: Provide the sole timestamp representation used across opx and the
// window math required for idempotent scheduled invocations.
// Dependencies: time
// ============================================================================

//! ## Overview
//! All timestamps in opx are UTC, serialized as RFC 3339 with millisecond
//! precision. This module is the only place that touches wall-clock time or
//! performs calendar arithmetic; every other module accepts timestamps as
//! plain values so replay and testing stay deterministic.

use time::Date;
use time::Month;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::Time;
use time::format_description::well_known::Rfc3339;

/// Errors raised while parsing or formatting timestamps.
#[derive(Debug, thiserror::Error)]
pub enum TimeError {
    /// The input string was not a valid RFC 3339 timestamp.
    #[error("invalid RFC 3339 timestamp: {0}")]
    InvalidTimestamp(String),
}

/// A UTC timestamp with millisecond precision, serialized as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Builds a timestamp from a `time::OffsetDateTime`, truncating to
    /// millisecond precision.
    #[must_use]
    pub fn from_offset_date_time(value: OffsetDateTime) -> Self {
        let value = value.to_offset(time::UtcOffset::UTC);
        let millis = value.millisecond();
        let truncated = value
            .replace_nanosecond(u32::from(millis) * 1_000_000)
            .unwrap_or(value);
        Self(truncated)
    }

    /// Parses an RFC 3339 string into a timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::InvalidTimestamp`] if parsing fails.
    pub fn parse(value: &str) -> Result<Self, TimeError> {
        let parsed = OffsetDateTime::parse(value, &Rfc3339)
            .map_err(|err| TimeError::InvalidTimestamp(err.to_string()))?;
        Ok(Self::from_offset_date_time(parsed))
    }

    /// Returns the RFC 3339 millisecond-precision string form.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.format(&Rfc3339).unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }

    /// Returns the underlying `time::OffsetDateTime`.
    #[must_use]
    pub const fn as_offset_date_time(&self) -> OffsetDateTime {
        self.0
    }

    /// Rounds this timestamp down to a fixed minute grid, returning the
    /// canonical `identityWindow` string (`YYYY-MM-DDTHH:MMZ`).
    #[must_use]
    pub fn identity_window(&self) -> String {
        let d = self.0.date();
        let t = self.0.time();
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}Z",
            d.year(),
            u8::from(d.month()),
            d.day(),
            t.hour(),
            t.minute()
        )
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Timestamp> for String {
    fn from(value: Timestamp) -> Self {
        value.to_rfc3339()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// A half-open-by-convention calendar window `[start, end]`, both inclusive
/// at millisecond precision per spec.md's window definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Window {
    /// Inclusive window start.
    pub start: Timestamp,
    /// Inclusive window end.
    pub end: Timestamp,
}

/// Returns `00:00:00.000` UTC on `date`.
fn midnight(date: Date) -> Timestamp {
    Timestamp::from_offset_date_time(PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc())
}

/// Returns `23:59:59.999` UTC on `date`.
fn end_of_day(date: Date) -> Timestamp {
    let end_time = Time::from_hms_milli(23, 59, 59, 999).unwrap_or(Time::MIDNIGHT);
    Timestamp::from_offset_date_time(PrimitiveDateTime::new(date, end_time).assume_utc())
}

/// Returns the `[yesterday 00:00, today 00:00)` daily pattern-extraction
/// window, represented with `end` set to `today 00:00` per spec.md (the
/// window is open on the right but the end timestamp is exact, not an
/// end-of-day 23:59:59.999 value).
#[must_use]
pub fn daily_window(now: Timestamp) -> Window {
    let today = now.as_offset_date_time().date();
    let yesterday = today.previous_day().unwrap_or(today);
    Window {
        start: midnight(yesterday),
        end: midnight(today),
    }
}

/// Returns the previous-Monday-through-previous-Sunday weekly window.
///
/// Weekly rule: if today's day-of-week `d` (`0` = Sunday), days back to the
/// last Monday = `6` if `d == 0`, else `d + 6`.
#[must_use]
pub fn weekly_window(now: Timestamp) -> Window {
    let today = now.as_offset_date_time().date();
    let d = sunday_indexed_weekday(today);
    let days_back_to_monday = if d == 0 { 6 } else { d + 6 };
    let last_sunday = subtract_days(today, days_back_to_monday - 6);
    let last_monday = subtract_days(today, days_back_to_monday);
    Window {
        start: midnight(last_monday),
        end: end_of_day(last_sunday),
    }
}

/// Returns the full-previous-calendar-month window, used by the monthly
/// calibration job and `MONTHLY` snapshots.
#[must_use]
pub fn monthly_window(now: Timestamp) -> Window {
    let today = now.as_offset_date_time().date();
    let (prev_year, prev_month) = previous_month(today.year(), today.month());
    let start_date = Date::from_calendar_date(prev_year, prev_month, 1).unwrap_or(today);
    let days_in_month = days_in_month(prev_year, prev_month);
    let end_date = Date::from_calendar_date(prev_year, prev_month, days_in_month).unwrap_or(today);
    Window {
        start: midnight(start_date),
        end: end_of_day(end_date),
    }
}

/// Returns `(year, month)` of the calendar month preceding `(year, month)`.
fn previous_month(year: i32, month: Month) -> (i32, Month) {
    if month == Month::January {
        (year - 1, Month::December)
    } else {
        (year, month.previous())
    }
}

/// Returns the number of days in `month` of `year`, leap-year aware.
fn days_in_month(year: i32, month: Month) -> u8 {
    month.length(year)
}

/// Returns `date`'s weekday remapped to Sunday = 0.
fn sunday_indexed_weekday(date: Date) -> u8 {
    // `time::Weekday` is Monday-indexed (Monday = 0); spec.md uses
    // Sunday-indexed (Sunday = 0), so remap.
    match date.weekday() {
        time::Weekday::Sunday => 0,
        time::Weekday::Monday => 1,
        time::Weekday::Tuesday => 2,
        time::Weekday::Wednesday => 3,
        time::Weekday::Thursday => 4,
        time::Weekday::Friday => 5,
        time::Weekday::Saturday => 6,
    }
}

/// Returns `date` minus `days` calendar days.
fn subtract_days(date: Date, days: u8) -> Date {
    let mut result = date;
    for _ in 0..days {
        result = result.previous_day().unwrap_or(result);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).expect("valid timestamp")
    }

    #[test]
    fn identity_window_rounds_down_to_minute() {
        let t = ts("2026-03-05T14:07:59.999Z");
        assert_eq!(t.identity_window(), "2026-03-05T14:07Z");
    }

    #[test]
    fn round_trip_preserves_millis() {
        let t = ts("2026-03-05T14:07:59.123Z");
        assert_eq!(t.to_rfc3339(), "2026-03-05T14:07:59.123Z");
    }

    #[test]
    fn s1_calibration_window_example() {
        let window = monthly_window(ts("2026-02-15T12:00:00.000Z"));
        assert_eq!(window.start.to_rfc3339(), "2026-01-01T00:00:00.000Z");
        assert_eq!(window.end.to_rfc3339(), "2026-01-31T23:59:59.999Z");
    }

    #[test]
    fn s2_weekly_window_example() {
        // 2026-02-15 is a Sunday.
        let window = weekly_window(ts("2026-02-15T12:00:00.000Z"));
        assert_eq!(window.start.to_rfc3339(), "2026-02-09T00:00:00.000Z");
        assert_eq!(window.end.to_rfc3339(), "2026-02-15T23:59:59.999Z");
    }

    #[test]
    fn daily_window_is_exclusive_on_the_right() {
        let window = daily_window(ts("2026-03-05T08:00:00.000Z"));
        assert_eq!(window.start.to_rfc3339(), "2026-03-04T00:00:00.000Z");
        assert_eq!(window.end.to_rfc3339(), "2026-03-05T00:00:00.000Z");
    }

    #[test]
    fn windows_are_idempotent_within_the_same_bucket() {
        let a = weekly_window(ts("2026-02-10T01:00:00.000Z"));
        let b = weekly_window(ts("2026-02-15T23:00:00.000Z"));
        assert_eq!(a, b);
    }
}
