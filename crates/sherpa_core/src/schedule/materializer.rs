//! Idempotent instance planning over a calendar-day window.
//!
//! # Responsibility
//! - Decide which `(item, day)` pairs in a window still need an instance.
//! - Enforce occurrence limits against existing plus newly planned instances.
//!
//! # Invariants
//! - Inverted windows produce an empty plan.
//! - Archived items produce nothing.
//! - Days are visited in ascending order per item, so limited rules fill
//!   their earliest eligible days first.
//! - Existing instances count as scheduled regardless of their status.

use crate::calendar;
use crate::model::instance::Instance;
use crate::model::item::{ItemId, ScheduleItem};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// Plans the pending instances missing from `[start, end]`.
///
/// `existing_by_item` must hold, per item, at least every instance inside the
/// window; for items whose rule has an occurrence limit it must hold every
/// instance ever created, since the limit budget is `limit - existing`.
/// Items absent from the map are treated as having no instances.
pub fn plan_schedule(
    items: &[ScheduleItem],
    existing_by_item: &HashMap<ItemId, Vec<Instance>>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<Instance> {
    let days = calendar::days_inclusive(start, end);
    if days.is_empty() {
        return Vec::new();
    }

    items
        .iter()
        .filter(|item| item.is_active())
        .flat_map(|item| {
            let existing = existing_by_item
                .get(&item.uuid)
                .map_or(&[][..], Vec::as_slice);
            plan_item(item, existing, &days)
        })
        .collect()
}

/// Plans missing instances for one item over an ascending list of days.
pub fn plan_item(item: &ScheduleItem, existing: &[Instance], days: &[NaiveDate]) -> Vec<Instance> {
    let mut scheduled: HashSet<NaiveDate> =
        existing.iter().map(|instance| instance.occurs_on).collect();
    let mut remaining = item
        .occurrence_limit()
        .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX).saturating_sub(existing.len()));

    let mut planned = Vec::new();
    for &day in days {
        if remaining == Some(0) {
            break;
        }
        if !item.due_on(day) || !scheduled.insert(day) {
            continue;
        }
        planned.push(Instance::pending(item.uuid, day));
        if let Some(budget) = remaining.as_mut() {
            *budget -= 1;
        }
    }
    planned
}

#[cfg(test)]
mod tests {
    use super::{plan_item, plan_schedule};
    use crate::calendar;
    use crate::model::instance::{CompletionState, Instance};
    use crate::model::item::ScheduleItem;
    use crate::model::recurrence::RecurrenceRule;
    use chrono::NaiveDate;
    use std::collections::{HashMap, HashSet};

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
    }

    #[test]
    fn inverted_window_plans_nothing() {
        let habit = ScheduleItem::habit("Read", RecurrenceRule::daily(1, day(2024, 1, 1)));
        let plan = plan_schedule(&[habit], &HashMap::new(), day(2024, 1, 5), day(2024, 1, 1));
        assert!(plan.is_empty());
    }

    #[test]
    fn daily_habit_gets_one_pending_instance_per_day() {
        let habit = ScheduleItem::habit("Meditate", RecurrenceRule::daily(1, day(2024, 1, 1)));
        let plan = plan_schedule(
            std::slice::from_ref(&habit),
            &HashMap::new(),
            day(2024, 1, 1),
            day(2024, 1, 7),
        );

        assert_eq!(plan.len(), 7);
        assert!(plan.iter().all(|instance| instance.status == CompletionState::Pending));
        assert!(plan.iter().all(|instance| instance.item_uuid == habit.uuid));
        let days = plan.iter().map(|instance| instance.occurs_on).collect::<Vec<_>>();
        assert_eq!(days, calendar::days_inclusive(day(2024, 1, 1), day(2024, 1, 7)));
    }

    #[test]
    fn existing_instances_in_any_status_are_not_replanned() {
        let habit = ScheduleItem::habit("Run", RecurrenceRule::daily(1, day(2024, 1, 1)));
        let mut skipped = Instance::pending(habit.uuid, day(2024, 1, 2));
        skipped.apply_status(CompletionState::SkippedWithNote, Some("rain"), 0);
        let mut done = Instance::pending(habit.uuid, day(2024, 1, 3));
        done.apply_status(CompletionState::Completed, None, 0);

        let plan = plan_item(
            &habit,
            &[skipped, done],
            &calendar::days_inclusive(day(2024, 1, 1), day(2024, 1, 4)),
        );
        let days = plan.iter().map(|instance| instance.occurs_on).collect::<Vec<_>>();
        assert_eq!(days, vec![day(2024, 1, 1), day(2024, 1, 4)]);
    }

    #[test]
    fn occurrence_limit_fills_earliest_days() {
        let rule = RecurrenceRule::daily(1, day(2024, 1, 1)).with_occurrence_limit(Some(2));
        let habit = ScheduleItem::habit("Hydrate", rule);
        let plan = plan_item(
            &habit,
            &[],
            &calendar::days_inclusive(day(2024, 1, 1), day(2024, 1, 6)),
        );
        let days = plan.iter().map(|instance| instance.occurs_on).collect::<Vec<_>>();
        assert_eq!(days, vec![day(2024, 1, 1), day(2024, 1, 2)]);
    }

    #[test]
    fn occurrence_limit_counts_existing_instances() {
        let rule = RecurrenceRule::daily(1, day(2024, 1, 1)).with_occurrence_limit(Some(3));
        let habit = ScheduleItem::habit("Stretch", rule);
        let existing = vec![
            Instance::pending(habit.uuid, day(2024, 1, 1)),
            Instance::pending(habit.uuid, day(2024, 1, 2)),
        ];
        let plan = plan_item(
            &habit,
            &existing,
            &calendar::days_inclusive(day(2024, 1, 1), day(2024, 1, 10)),
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].occurs_on, day(2024, 1, 3));

        let exhausted = plan_item(
            &habit,
            &[existing.clone(), plan].concat(),
            &calendar::days_inclusive(day(2024, 1, 1), day(2024, 1, 10)),
        );
        assert!(exhausted.is_empty());
    }

    #[test]
    fn archived_items_are_skipped() {
        let mut habit = ScheduleItem::habit("Old", RecurrenceRule::daily(1, day(2024, 1, 1)));
        habit.archive();
        let plan = plan_schedule(&[habit], &HashMap::new(), day(2024, 1, 1), day(2024, 1, 3));
        assert!(plan.is_empty());
    }

    #[test]
    fn tasks_fall_back_to_due_date() {
        let due = ScheduleItem::task("File taxes", Some(day(2024, 4, 15)), None);
        let undated = ScheduleItem::task("Someday", None, None);
        let plan = plan_schedule(
            &[due.clone(), undated],
            &HashMap::new(),
            day(2024, 4, 1),
            day(2024, 4, 30),
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].item_uuid, due.uuid);
        assert_eq!(plan[0].occurs_on, day(2024, 4, 15));
    }

    #[test]
    fn task_rule_wins_over_due_date() {
        let rule = RecurrenceRule::weekly(1, day(2024, 1, 1), Vec::new());
        let task = ScheduleItem::task("Review", Some(day(2024, 1, 20)), Some(rule));
        let plan = plan_item(
            &task,
            &[],
            &calendar::days_inclusive(day(2024, 1, 1), day(2024, 1, 3)),
        );
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn planned_pairs_are_unique() {
        let items = vec![
            ScheduleItem::habit("A", RecurrenceRule::daily(1, day(2024, 1, 1))),
            ScheduleItem::habit("B", RecurrenceRule::daily(2, day(2024, 1, 1))),
            ScheduleItem::task("C", Some(day(2024, 1, 3)), None),
        ];
        let plan = plan_schedule(&items, &HashMap::new(), day(2024, 1, 1), day(2024, 1, 31));
        let pairs = plan
            .iter()
            .map(|instance| (instance.item_uuid, instance.occurs_on))
            .collect::<HashSet<_>>();
        assert_eq!(pairs.len(), plan.len());
        assert_eq!(plan.len(), 31 + 16 + 1);
    }
}
