//! Local calendar-day utilities shared by recurrence and scheduling code.
//!
//! # Responsibility
//! - Resolve the local calendar day and the current timestamp.
//! - Provide whole-day/week/month arithmetic that is immune to DST shifts.
//!
//! # Invariants
//! - Every "day" value is a `NaiveDate`; no time component is carried.
//! - Week arithmetic counts calendar weeks starting on Sunday, so a year
//!   rollover never wraps the difference.
//! - Helpers saturate instead of panicking on out-of-range input.

use chrono::{Datelike, Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Returns today's local calendar day.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Returns the current time as Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    Local::now().timestamp_millis()
}

/// Signed number of whole calendar days from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}

/// Signed number of calendar weeks between the weeks containing `from` and `to`.
///
/// Both dates are first moved back to the Sunday that starts their week, so
/// `2020-12-28 -> 2021-01-04` is exactly one week.
pub fn weeks_between(from: NaiveDate, to: NaiveDate) -> i64 {
    days_between(start_of_week(from), start_of_week(to)) / 7
}

/// Signed number of calendar months from `from` to `to`, ignoring the day.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let from_index = i64::from(from.year()) * 12 + i64::from(from.month0());
    let to_index = i64::from(to.year()) * 12 + i64::from(to.month0());
    to_index - from_index
}

/// Number of days in the given month, or `0` when the month is invalid.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    (28..=31)
        .rev()
        .find(|day| NaiveDate::from_ymd_opt(year, month, *day).is_some())
        .unwrap_or(0)
}

/// Sunday on or before `day`.
pub fn start_of_week(day: NaiveDate) -> NaiveDate {
    let offset = i64::from(day.weekday().num_days_from_sunday());
    add_days(day, -offset)
}

/// Adds a signed number of days, saturating at the representable bounds.
pub fn add_days(day: NaiveDate, days: i64) -> NaiveDate {
    if days >= 0 {
        day.checked_add_days(Days::new(days.unsigned_abs()))
            .unwrap_or(NaiveDate::MAX)
    } else {
        day.checked_sub_days(Days::new(days.unsigned_abs()))
            .unwrap_or(NaiveDate::MIN)
    }
}

/// Inclusive ascending list of days; empty when `end < start`.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if end < start {
        return Vec::new();
    }
    start.iter_days().take_while(|day| *day <= end).collect()
}

/// Parses a `YYYY-MM-DD` calendar day.
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DAY_FORMAT).ok()
}

/// Formats a calendar day as `YYYY-MM-DD`.
pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Inclusive calendar-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range, or `None` when `end < start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        if end < start {
            return None;
        }
        Some(Self { start, end })
    }

    /// Single-day range.
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// Range spanning `days_before` days before and `days_after` days after `anchor`.
    pub fn around(anchor: NaiveDate, days_before: u32, days_after: u32) -> Self {
        Self {
            start: add_days(anchor, -i64::from(days_before)),
            end: add_days(anchor, i64::from(days_after)),
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Number of days covered, counting both ends.
    pub fn len_days(&self) -> i64 {
        days_between(self.start, self.end) + 1
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        days_inclusive(self.start, self.end)
    }
}
