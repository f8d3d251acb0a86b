//! Streak qualification for a set of scheduled instances.

use crate::model::instance::{CompletionState, Instance};
use crate::model::item::ItemKind;

// 40% of eligible habit instances must be completed.
const STREAK_RATIO_NUMERATOR: usize = 2;
const STREAK_RATIO_DENOMINATOR: usize = 5;

/// Returns whether the given instances qualify for streak credit.
///
/// Only habit instances are eligible, and skip-with-note instances are
/// removed from the eligible set entirely. An empty eligible set never
/// qualifies; otherwise at least `max(1, ceil(eligible * 0.4))` must be
/// completed.
pub fn qualifies_for_streak<'a>(
    instances: impl IntoIterator<Item = (ItemKind, &'a Instance)>,
) -> bool {
    let (eligible, completed) = instances
        .into_iter()
        .filter(|(kind, instance)| {
            *kind == ItemKind::Habit && instance.status != CompletionState::SkippedWithNote
        })
        .fold((0usize, 0usize), |(eligible, completed), (_, instance)| {
            (
                eligible + 1,
                completed + usize::from(instance.status.is_completed()),
            )
        });

    if eligible == 0 {
        return false;
    }
    completed >= streak_threshold(eligible)
}

fn streak_threshold(eligible: usize) -> usize {
    let scaled = eligible * STREAK_RATIO_NUMERATOR;
    scaled.div_ceil(STREAK_RATIO_DENOMINATOR).max(1)
}
