//! Schedulable item model (habits and tasks).
//!
//! # Responsibility
//! - Define the canonical record that owns a recurrence rule or a due date.
//! - Decide whether an item is due on a given calendar day.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another item.
//! - Habits always carry a recurrence rule and never a due date.
//! - Tasks carry a rule, a one-shot due date, or neither (never due).
//! - Archived items are never materialized.

use crate::calendar;
use crate::model::recurrence::RecurrenceRule;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for habits and tasks.
pub type ItemId = Uuid;

/// Category of a schedulable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Repeating routine; counts toward streaks.
    Habit,
    /// One-off or repeating to-do; never affects streaks.
    Task,
}

/// Validation errors for item write paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValidationError {
    NilUuid,
    EmptyTitle,
    HabitWithoutRule,
    HabitWithDueDate,
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilUuid => write!(f, "uuid must not be nil"),
            Self::EmptyTitle => write!(f, "title must not be empty"),
            Self::HabitWithoutRule => write!(f, "habit requires a recurrence rule"),
            Self::HabitWithDueDate => write!(f, "habit must not carry a due date"),
        }
    }
}

impl Error for ItemValidationError {}

/// Habit or task that the materializer expands into instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub uuid: ItemId,
    pub kind: ItemKind,
    pub title: String,
    pub detail: Option<String>,
    /// Unix epoch milliseconds. Drives deterministic fetch order.
    pub created_at: i64,
    /// Tasks only; used when no recurrence rule is present.
    pub due_date: Option<NaiveDate>,
    pub recurrence: Option<RecurrenceRule>,
    pub is_archived: bool,
}

impl ScheduleItem {
    /// Creates a habit with a generated stable ID.
    pub fn habit(title: impl Into<String>, rule: RecurrenceRule) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            kind: ItemKind::Habit,
            title: title.into(),
            detail: None,
            created_at: calendar::now_epoch_ms(),
            due_date: None,
            recurrence: Some(rule.normalized()),
            is_archived: false,
        }
    }

    /// Creates a task with a generated stable ID.
    pub fn task(
        title: impl Into<String>,
        due_date: Option<NaiveDate>,
        rule: Option<RecurrenceRule>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            kind: ItemKind::Task,
            title: title.into(),
            detail: None,
            created_at: calendar::now_epoch_ms(),
            due_date,
            recurrence: rule.map(RecurrenceRule::normalized),
            is_archived: false,
        }
    }

    pub fn validate(&self) -> Result<(), ItemValidationError> {
        if self.uuid.is_nil() {
            return Err(ItemValidationError::NilUuid);
        }
        if self.title.trim().is_empty() {
            return Err(ItemValidationError::EmptyTitle);
        }
        if self.kind == ItemKind::Habit {
            if self.recurrence.is_none() {
                return Err(ItemValidationError::HabitWithoutRule);
            }
            if self.due_date.is_some() {
                return Err(ItemValidationError::HabitWithDueDate);
            }
        }
        Ok(())
    }

    /// Returns whether the item should have an instance on `day`.
    ///
    /// A rule always wins over a due date.
    pub fn due_on(&self, day: NaiveDate) -> bool {
        match (&self.recurrence, self.due_date) {
            (Some(rule), _) => rule.occurs(day),
            (None, Some(due)) => due == day,
            (None, None) => false,
        }
    }

    /// Occurrence cap of the item's rule, if any.
    pub fn occurrence_limit(&self) -> Option<u32> {
        self.recurrence
            .as_ref()
            .and_then(|rule| rule.occurrence_limit)
    }

    pub fn archive(&mut self) {
        self.is_archived = true;
    }

    pub fn is_active(&self) -> bool {
        !self.is_archived
    }
}
