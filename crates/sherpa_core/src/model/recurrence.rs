//! Recurrence rule model and occurrence predicate.
//!
//! # Responsibility
//! - Describe when a habit/task repeats (once, daily, weekly, monthly).
//! - Answer "does this rule produce an occurrence on day X" without I/O.
//!
//! # Invariants
//! - `interval >= 1`; smaller persisted values are clamped, never rejected.
//! - `weekdays` is sorted and deduplicated.
//! - `day_of_month_override` is within `1..=31` when set.
//! - `occurrence_limit >= 1` when set. The limit is stored here but enforced
//!   by the materializer; `occurs` has no memory of past occurrences.
//! - `occurs` never panics for any rule value.

use crate::calendar;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Supported recurrence frequencies for habits/tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceFrequency {
    /// Single occurrence on the start date.
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl RecurrenceFrequency {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Once => "One time",
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
        }
    }

    pub fn is_repeating(self) -> bool {
        self != Self::Once
    }
}

/// Day of week using the Sunday = 1 ... Saturday = 7 index convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weekday {
    Sunday = 1,
    Monday = 2,
    Tuesday = 3,
    Wednesday = 4,
    Thursday = 5,
    Friday = 6,
    Saturday = 7,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Sunday,
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    /// Monday through Friday.
    pub const WORKDAYS: [Weekday; 5] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
    ];

    /// Index in `1..=7`, Sunday first.
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            1 => Some(Self::Sunday),
            2 => Some(Self::Monday),
            3 => Some(Self::Tuesday),
            4 => Some(Self::Wednesday),
            5 => Some(Self::Thursday),
            6 => Some(Self::Friday),
            7 => Some(Self::Saturday),
            _ => None,
        }
    }

    /// Weekday of a calendar day.
    pub fn of(day: NaiveDate) -> Self {
        day.weekday().into()
    }

    pub fn short_symbol(self) -> &'static str {
        match self {
            Self::Sunday => "Su",
            Self::Monday => "Mo",
            Self::Tuesday => "Tu",
            Self::Wednesday => "We",
            Self::Thursday => "Th",
            Self::Friday => "Fr",
            Self::Saturday => "Sa",
        }
    }

    pub fn long_name(self) -> &'static str {
        match self {
            Self::Sunday => "Sunday",
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(value: chrono::Weekday) -> Self {
        match value {
            chrono::Weekday::Sun => Self::Sunday,
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
        }
    }
}

/// Rule describing when an item should be scheduled.
///
/// Fields are public for storage mapping; values loaded from outside the
/// constructors should go through [`RecurrenceRule::normalized`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: RecurrenceFrequency,
    /// Every N days/weeks/months. Ignored for `Once`.
    pub interval: u32,
    /// Anchor day; occurrences never precede it.
    pub start_date: NaiveDate,
    /// Weekly only. Empty means every day of a matching week.
    pub weekdays: Vec<Weekday>,
    /// Monthly only. Falls back to `start_date.day()`.
    pub day_of_month_override: Option<u32>,
    /// Inclusive cutoff.
    pub end_date: Option<NaiveDate>,
    /// Total occurrences the rule may ever produce.
    pub occurrence_limit: Option<u32>,
}

impl RecurrenceRule {
    /// Creates a rule with no weekday filter, month override, end or limit.
    pub fn new(frequency: RecurrenceFrequency, interval: u32, start_date: NaiveDate) -> Self {
        Self {
            frequency,
            interval: interval.max(1),
            start_date,
            weekdays: Vec::new(),
            day_of_month_override: None,
            end_date: None,
            occurrence_limit: None,
        }
    }

    pub fn once(start_date: NaiveDate) -> Self {
        Self::new(RecurrenceFrequency::Once, 1, start_date)
    }

    pub fn daily(interval: u32, start_date: NaiveDate) -> Self {
        Self::new(RecurrenceFrequency::Daily, interval, start_date)
    }

    pub fn weekly(
        interval: u32,
        start_date: NaiveDate,
        weekdays: impl IntoIterator<Item = Weekday>,
    ) -> Self {
        let mut rule = Self::new(RecurrenceFrequency::Weekly, interval, start_date);
        rule.weekdays = normalize_weekdays(weekdays);
        rule
    }

    pub fn monthly(interval: u32, start_date: NaiveDate, day_of_month: Option<u32>) -> Self {
        let mut rule = Self::new(RecurrenceFrequency::Monthly, interval, start_date);
        rule.day_of_month_override = day_of_month.map(clamp_day_of_month);
        rule
    }

    pub fn with_end_date(mut self, end_date: Option<NaiveDate>) -> Self {
        self.end_date = end_date;
        self
    }

    pub fn with_occurrence_limit(mut self, limit: Option<u32>) -> Self {
        self.occurrence_limit = limit.map(|value| value.max(1));
        self
    }

    /// Re-applies every construction invariant.
    ///
    /// Used on values decoded from storage or deserialized from callers.
    pub fn normalized(mut self) -> Self {
        self.interval = self.interval.max(1);
        self.weekdays = normalize_weekdays(std::mem::take(&mut self.weekdays));
        self.day_of_month_override = self.day_of_month_override.map(clamp_day_of_month);
        self.occurrence_limit = self.occurrence_limit.map(|value| value.max(1));
        self
    }

    /// Day of month targeted by monthly rules before month-length clamping.
    pub fn target_day_of_month(&self) -> u32 {
        clamp_day_of_month(
            self.day_of_month_override
                .unwrap_or_else(|| self.start_date.day()),
        )
    }

    /// Returns true if the rule results in an occurrence on `date`.
    pub fn occurs(&self, date: NaiveDate) -> bool {
        if date < self.start_date {
            return false;
        }
        if self.end_date.is_some_and(|end| date > end) {
            return false;
        }

        let interval = i64::from(self.interval.max(1));
        match self.frequency {
            RecurrenceFrequency::Once => date == self.start_date,
            RecurrenceFrequency::Daily => {
                calendar::days_between(self.start_date, date) % interval == 0
            }
            RecurrenceFrequency::Weekly => {
                if calendar::weeks_between(self.start_date, date) % interval != 0 {
                    return false;
                }
                self.weekdays.is_empty() || self.weekdays.contains(&Weekday::of(date))
            }
            RecurrenceFrequency::Monthly => {
                if calendar::months_between(self.start_date, date) % interval != 0 {
                    return false;
                }
                // Target days past the month length land on the last day.
                let last_day = calendar::days_in_month(date.year(), date.month());
                date.day() == self.target_day_of_month().min(last_day)
            }
        }
    }

    /// Ascending occurrence days within `[from, to]`, ignoring the occurrence limit.
    pub fn occurrences_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
        let from = from.max(self.start_date);
        let to = match self.end_date {
            Some(end) => to.min(end),
            None => to,
        };
        calendar::days_inclusive(from, to)
            .into_iter()
            .filter(|day| self.occurs(*day))
            .collect()
    }

    /// First occurrence on or after `date`, searching at most `horizon_days` ahead.
    pub fn first_occurrence_on_or_after(
        &self,
        date: NaiveDate,
        horizon_days: u32,
    ) -> Option<NaiveDate> {
        let from = date.max(self.start_date);
        let to = calendar::add_days(from, i64::from(horizon_days));
        self.occurrences_between(from, to).into_iter().next()
    }
}

fn normalize_weekdays(weekdays: impl IntoIterator<Item = Weekday>) -> Vec<Weekday> {
    let mut normalized = weekdays.into_iter().collect::<Vec<_>>();
    normalized.sort();
    normalized.dedup();
    normalized
}

fn clamp_day_of_month(day: u32) -> u32 {
    day.clamp(1, 31)
}
