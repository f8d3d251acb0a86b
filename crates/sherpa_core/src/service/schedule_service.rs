//! Schedule use-case service.
//!
//! # Responsibility
//! - Keep persisted instances covering the window the UI is showing.
//! - Provide day/range read-back for rendering.
//!
//! # Invariants
//! - Existing instances are re-read from the repository on every call; no
//!   schedule state is cached between calls.
//! - All insertions of one call go through a single batch write, and an
//!   empty plan performs no write at all.
//! - Fetch, plan and insert run under one repository write lock, so a racing
//!   call cannot spend the same occurrence-limit budget twice.
//! - Repository errors propagate unchanged; nothing is retried here.

use crate::calendar::{self, DateRange};
use crate::model::instance::Instance;
use crate::model::item::{ItemId, ItemKind};
use crate::repo::schedule_repo::{RepoResult, ScheduleRepository};
use crate::schedule::materializer::plan_schedule;
use crate::service::streak::qualifies_for_streak;
use chrono::NaiveDate;
use log::{error, info, warn};
use std::collections::HashMap;
use std::time::Instant;

/// Days before the anchor covered by [`ScheduleService::ensure_default_window`].
pub const DEFAULT_DAYS_BEFORE: u32 = 3;
/// Days after the anchor covered by [`ScheduleService::ensure_default_window`].
pub const DEFAULT_DAYS_AFTER: u32 = 14;

/// Summary of one `ensure_schedule` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// Days in the requested window; `0` for an inverted window.
    pub range_days: usize,
    /// Active items evaluated.
    pub items_considered: usize,
    /// Instances written by this call.
    pub inserted: usize,
    /// Planned instances dropped because another writer created them first.
    pub skipped_conflicts: usize,
}

/// Materializes instances through a repository implementation.
pub struct ScheduleService<R: ScheduleRepository> {
    repo: R,
}

impl<R: ScheduleRepository> ScheduleService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Ensures every due `(item, day)` in `[start, end]` has exactly one instance.
    ///
    /// # Contract
    /// - `end < start` is a no-op returning an empty outcome, not an error.
    /// - Calling twice with the same arguments inserts nothing the second time.
    /// - Occurrence limits count every existing instance of the item.
    ///
    /// # Errors
    /// - Returns repository errors from fetches or from the batch insert.
    pub fn ensure_schedule(&self, start: NaiveDate, end: NaiveDate) -> RepoResult<ScheduleOutcome> {
        let started_at = Instant::now();
        let Some(range) = DateRange::new(start, end) else {
            info!(
                "event=schedule_ensure module=schedule status=skipped reason=inverted_range start={} end={}",
                calendar::format_day(start),
                calendar::format_day(end)
            );
            return Ok(ScheduleOutcome::default());
        };

        match self.materialize(range) {
            Ok(outcome) => {
                if outcome.skipped_conflicts > 0 {
                    warn!(
                        "event=schedule_ensure module=schedule status=conflict skipped_conflicts={}",
                        outcome.skipped_conflicts
                    );
                }
                info!(
                    "event=schedule_ensure module=schedule status=ok start={} end={} items={} inserted={} duration_ms={}",
                    calendar::format_day(range.start),
                    calendar::format_day(range.end),
                    outcome.items_considered,
                    outcome.inserted,
                    started_at.elapsed().as_millis()
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(
                    "event=schedule_ensure module=schedule status=error start={} end={} duration_ms={} error={}",
                    calendar::format_day(range.start),
                    calendar::format_day(range.end),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Ensures the window `[anchor - days_before, anchor + days_after]`.
    pub fn ensure_window(
        &self,
        anchor: NaiveDate,
        days_before: u32,
        days_after: u32,
    ) -> RepoResult<ScheduleOutcome> {
        let window = DateRange::around(anchor, days_before, days_after);
        self.ensure_schedule(window.start, window.end)
    }

    /// Ensures the default calendar-strip window around `anchor`.
    pub fn ensure_default_window(&self, anchor: NaiveDate) -> RepoResult<ScheduleOutcome> {
        self.ensure_window(anchor, DEFAULT_DAYS_BEFORE, DEFAULT_DAYS_AFTER)
    }

    /// Instances of every item on `day`.
    pub fn instances_on(&self, day: NaiveDate) -> RepoResult<Vec<Instance>> {
        self.repo.list_instances(DateRange::single(day))
    }

    /// Instances of every item within `range`, ordered by day.
    pub fn instances_between(&self, range: DateRange) -> RepoResult<Vec<Instance>> {
        self.repo.list_instances(range)
    }

    /// Returns whether the habits scheduled on `day` earn streak credit.
    ///
    /// Instances of archived or missing items are ignored.
    pub fn day_qualifies_for_streak(&self, day: NaiveDate) -> RepoResult<bool> {
        let instances = self.instances_on(day)?;
        let kinds: HashMap<ItemId, ItemKind> = self
            .repo
            .fetch_active_items()?
            .into_iter()
            .map(|item| (item.uuid, item.kind))
            .collect();

        Ok(qualifies_for_streak(instances.iter().filter_map(|instance| {
            kinds
                .get(&instance.item_uuid)
                .map(|kind| (*kind, instance))
        })))
    }

    fn materialize(&self, range: DateRange) -> RepoResult<ScheduleOutcome> {
        self.repo.with_write_lock(|| {
            let items = self.repo.fetch_active_items()?;

            let mut existing_by_item = HashMap::with_capacity(items.len());
            for item in &items {
                // Limited rules need the full history to compute the remaining budget.
                let scope = match item.occurrence_limit() {
                    Some(_) => None,
                    None => Some(range),
                };
                existing_by_item.insert(item.uuid, self.repo.fetch_instances(item.uuid, scope)?);
            }

            let planned = plan_schedule(&items, &existing_by_item, range.start, range.end);
            let mut outcome = ScheduleOutcome {
                range_days: range.days().len(),
                items_considered: items.len(),
                ..ScheduleOutcome::default()
            };
            if planned.is_empty() {
                return Ok(outcome);
            }

            let report = self.repo.insert_instances(&planned)?;
            outcome.inserted = report.inserted;
            outcome.skipped_conflicts = report.skipped_conflicts;
            Ok(outcome)
        })
    }
}
