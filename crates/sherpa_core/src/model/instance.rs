//! Materialized occurrence model.
//!
//! # Responsibility
//! - Represent one concrete scheduled occurrence of an item on one day.
//! - Own completion-state transitions and their side fields.
//!
//! # Invariants
//! - At most one instance exists per `(item_uuid, occurs_on)`.
//! - `completed_at` is set exactly when `status == Completed`.
//! - `note` is kept only when `status == SkippedWithNote`.

use crate::model::item::ItemId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a materialized instance.
pub type InstanceId = Uuid;

/// Completion state for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Pending,
    Completed,
    Skipped,
    /// Skipped with a reason; excluded from streak thresholds.
    SkippedWithNote,
}

impl CompletionState {
    pub fn is_completed(self) -> bool {
        self == Self::Completed
    }

    pub fn is_skipped_with_note(self) -> bool {
        self == Self::SkippedWithNote
    }
}

/// Scheduled occurrence for a habit or a task.
///
/// References its owner by ID only; there is no back pointer to maintain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub uuid: InstanceId,
    pub item_uuid: ItemId,
    pub occurs_on: NaiveDate,
    pub status: CompletionState,
    pub note: Option<String>,
    /// Unix epoch milliseconds.
    pub completed_at: Option<i64>,
}

impl Instance {
    /// Creates a pending instance with a generated stable ID.
    pub fn pending(item_uuid: ItemId, occurs_on: NaiveDate) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            item_uuid,
            occurs_on,
            status: CompletionState::Pending,
            note: None,
            completed_at: None,
        }
    }

    /// Moves the instance to `status`, keeping side fields consistent.
    ///
    /// `now_ms` is recorded as `completed_at` only when the instance becomes
    /// `Completed`; completing it again keeps the first stamp. A blank note is
    /// treated as absent.
    pub fn apply_status(&mut self, status: CompletionState, note: Option<&str>, now_ms: i64) {
        self.completed_at = match status {
            CompletionState::Completed if self.status == CompletionState::Completed => {
                self.completed_at.or(Some(now_ms))
            }
            CompletionState::Completed => Some(now_ms),
            _ => None,
        };
        self.status = status;
        self.note = match status {
            CompletionState::SkippedWithNote => note
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::{CompletionState, Instance};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn instance() -> Instance {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid test date");
        Instance::pending(Uuid::new_v4(), day)
    }

    #[test]
    fn pending_starts_clean() {
        let instance = instance();
        assert_eq!(instance.status, CompletionState::Pending);
        assert_eq!(instance.note, None);
        assert_eq!(instance.completed_at, None);
    }

    #[test]
    fn completing_sets_and_reopening_clears_completed_at() {
        let mut instance = instance();
        instance.apply_status(CompletionState::Completed, None, 1_700_000_000_000);
        assert_eq!(instance.completed_at, Some(1_700_000_000_000));

        instance.apply_status(CompletionState::Pending, None, 1_700_000_100_000);
        assert_eq!(instance.completed_at, None);
    }

    #[test]
    fn note_only_survives_skip_with_note() {
        let mut instance = instance();
        instance.apply_status(CompletionState::SkippedWithNote, Some("  Injured  "), 0);
        assert_eq!(instance.note.as_deref(), Some("Injured"));
        assert!(instance.status.is_skipped_with_note());

        instance.apply_status(CompletionState::Skipped, Some("ignored"), 0);
        assert_eq!(instance.note, None);

        instance.apply_status(CompletionState::SkippedWithNote, Some("   "), 0);
        assert_eq!(instance.note, None);
    }

    #[test]
    fn completing_twice_keeps_first_completed_at() {
        let mut instance = instance();
        instance.apply_status(CompletionState::Completed, None, 1_700_000_000_000);
        instance.apply_status(CompletionState::Completed, None, 1_700_000_500_000);
        assert_eq!(instance.completed_at, Some(1_700_000_000_000));

        instance.apply_status(CompletionState::Skipped, None, 1_700_000_600_000);
        instance.apply_status(CompletionState::Completed, None, 1_700_000_700_000);
        assert_eq!(instance.completed_at, Some(1_700_000_700_000));
    }
}
