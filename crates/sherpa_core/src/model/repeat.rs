//! Repeat picker configuration and its mapping to recurrence rules.
//!
//! # Responsibility
//! - Model the repeat/end choices a user makes when adding a habit.
//! - Build normalized `RecurrenceRule` values from those choices.
//! - Render short human-readable summaries for picker rows.
//!
//! # Invariants
//! - Built rules always satisfy `RecurrenceRule` construction invariants.
//! - An empty weekly selection falls back to the start date's weekday.
//! - Monthly rules start on their first real occurrence on/after the start.

use crate::calendar;
use crate::model::recurrence::{RecurrenceRule, Weekday};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How often a new item repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RepeatPattern {
    /// Does not repeat; a single occurrence on the start date.
    None,
    Daily { interval: u32 },
    Weekly { interval: u32, weekdays: BTreeSet<Weekday> },
    Monthly { interval: u32, day: u32 },
}

/// When a repeating item stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum RepeatEnd {
    Never,
    OnDate(NaiveDate),
    AfterOccurrences(u32),
}

impl RepeatEnd {
    /// Inclusive end day, never earlier than `start_date`.
    pub fn end_date(self, start_date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::OnDate(day) => Some(day.max(start_date)),
            Self::Never | Self::AfterOccurrences(_) => None,
        }
    }

    pub fn occurrence_limit(self) -> Option<u32> {
        match self {
            Self::AfterOccurrences(count) => Some(count.max(1)),
            Self::Never | Self::OnDate(_) => None,
        }
    }

    pub fn summary(self) -> String {
        match self {
            Self::Never => "Never".to_string(),
            Self::OnDate(day) => format!("On {}", calendar::format_day(day)),
            Self::AfterOccurrences(count) => {
                format!("After {count} time{}", if count == 1 { "" } else { "s" })
            }
        }
    }
}

/// Repeat pattern plus end condition as chosen in the picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatConfiguration {
    pub pattern: RepeatPattern,
    pub end: RepeatEnd,
}

impl Default for RepeatConfiguration {
    fn default() -> Self {
        Self {
            pattern: RepeatPattern::None,
            end: RepeatEnd::Never,
        }
    }
}

impl RepeatConfiguration {
    pub fn new(pattern: RepeatPattern, end: RepeatEnd) -> Self {
        Self { pattern, end }
    }

    /// Builds the rule for an item starting on `start_date`.
    pub fn recurrence_rule(&self, start_date: NaiveDate) -> RecurrenceRule {
        let end_date = self.end.end_date(start_date);
        let limit = self.end.occurrence_limit();

        match &self.pattern {
            RepeatPattern::None => RecurrenceRule::once(start_date),
            RepeatPattern::Daily { interval } => RecurrenceRule::daily(*interval, start_date)
                .with_end_date(end_date)
                .with_occurrence_limit(limit),
            RepeatPattern::Weekly { interval, weekdays } => {
                let days = if weekdays.is_empty() {
                    vec![Weekday::of(start_date)]
                } else {
                    weekdays.iter().copied().collect()
                };
                RecurrenceRule::weekly(*interval, start_date, days)
                    .with_end_date(end_date)
                    .with_occurrence_limit(limit)
            }
            RepeatPattern::Monthly { interval, day } => {
                let target_day = (*day).clamp(1, 31);
                let first = first_monthly_occurrence(start_date, target_day);
                RecurrenceRule::monthly(*interval, first, Some(target_day))
                    .with_end_date(end_date)
                    .with_occurrence_limit(limit)
            }
        }
    }

    /// Short description of the repeat pattern.
    pub fn summary(&self) -> String {
        match &self.pattern {
            RepeatPattern::None => "Does not repeat".to_string(),
            RepeatPattern::Daily { interval } => match interval {
                0 | 1 => "Every day".to_string(),
                n => format!("Every {n} days"),
            },
            RepeatPattern::Weekly { interval, weekdays } => weekly_summary(*interval, weekdays),
            RepeatPattern::Monthly { interval, day } => {
                let day = (*day).clamp(1, 31);
                let suffix = ordinal_suffix(day);
                match interval {
                    0 | 1 => format!("Monthly on the {day}{suffix}"),
                    n => format!("Every {n} months on the {day}{suffix}"),
                }
            }
        }
    }
}

fn weekly_summary(interval: u32, weekdays: &BTreeSet<Weekday>) -> String {
    let every_week = interval <= 1;
    if weekdays.is_empty() {
        return if every_week {
            "Every week".to_string()
        } else {
            format!("Every {interval} weeks")
        };
    }

    if weekdays.iter().copied().eq(Weekday::WORKDAYS) {
        return if every_week {
            "Weekdays".to_string()
        } else {
            format!("Weekdays every {interval} weeks")
        };
    }

    if weekdays.len() == 1 {
        if let Some(day) = weekdays.first() {
            return if every_week {
                format!("Every {}", day.long_name())
            } else {
                format!("Every {interval} weeks on {}", day.long_name())
            };
        }
    }

    let labels = weekdays
        .iter()
        .map(|day| day.short_symbol())
        .collect::<Vec<_>>()
        .join(", ");
    if every_week {
        format!("Weekly on {labels}")
    } else {
        format!("Every {interval} weeks ({labels})")
    }
}

/// First day on/after `start` that a monthly rule targeting `target_day` hits.
fn first_monthly_occurrence(start: NaiveDate, target_day: u32) -> NaiveDate {
    let same_month_day = target_day.min(calendar::days_in_month(start.year(), start.month()));
    if let Some(candidate) = start.with_day(same_month_day) {
        if candidate >= start {
            return candidate;
        }
    }

    let (year, month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    let next_month_day = target_day.min(calendar::days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, next_month_day).unwrap_or(start)
}

fn ordinal_suffix(value: u32) -> &'static str {
    if (value / 10) % 10 == 1 {
        return "th";
    }
    match value % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}
