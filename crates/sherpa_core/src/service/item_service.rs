//! Habit/task use-case service.
//!
//! # Responsibility
//! - Create habits and tasks from UI input, including repeat picker choices.
//! - Archive items and apply instance status updates.
//!
//! # Invariants
//! - Titles are trimmed before persistence; blank titles are rejected.
//! - Status updates go through `Instance::apply_status`, so `completed_at`
//!   and `note` stay consistent with the status.
//! - Service layer remains storage-agnostic.

use crate::calendar;
use crate::model::instance::{CompletionState, Instance, InstanceId};
use crate::model::item::{ItemId, ScheduleItem};
use crate::model::recurrence::RecurrenceRule;
use crate::model::repeat::RepeatConfiguration;
use crate::repo::schedule_repo::{RepoError, ScheduleRepository};
use chrono::NaiveDate;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for item use-cases.
#[derive(Debug)]
pub enum ItemServiceError {
    /// Title is empty after trimming.
    EmptyTitle,
    ItemNotFound(ItemId),
    InstanceNotFound(InstanceId),
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for ItemServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "title must not be empty"),
            Self::ItemNotFound(id) => write!(f, "schedule item not found: {id}"),
            Self::InstanceNotFound(id) => write!(f, "instance not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent item state: {details}"),
        }
    }
}

impl Error for ItemServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ItemServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::ItemNotFound(id) => Self::ItemNotFound(id),
            RepoError::InstanceNotFound(id) => Self::InstanceNotFound(id),
            other => Self::Repo(other),
        }
    }
}

pub type ItemServiceResult<T> = Result<T, ItemServiceError>;

/// Item service facade over repository implementations.
pub struct ItemService<R: ScheduleRepository> {
    repo: R,
}

impl<R: ScheduleRepository> ItemService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates a habit driven by `rule`.
    pub fn create_habit(
        &self,
        title: &str,
        rule: RecurrenceRule,
    ) -> ItemServiceResult<ScheduleItem> {
        let title = normalize_title(title)?;
        self.persist(ScheduleItem::habit(title, rule))
    }

    /// Creates a habit from repeat picker choices starting on `start_date`.
    pub fn create_habit_from_repeat(
        &self,
        title: &str,
        start_date: NaiveDate,
        repeat: &RepeatConfiguration,
    ) -> ItemServiceResult<ScheduleItem> {
        self.create_habit(title, repeat.recurrence_rule(start_date))
    }

    /// Creates a task with an optional one-shot due date and optional rule.
    pub fn create_task(
        &self,
        title: &str,
        due_date: Option<NaiveDate>,
        rule: Option<RecurrenceRule>,
    ) -> ItemServiceResult<ScheduleItem> {
        let title = normalize_title(title)?;
        self.persist(ScheduleItem::task(title, due_date, rule))
    }

    pub fn get_item(&self, id: ItemId) -> ItemServiceResult<Option<ScheduleItem>> {
        Ok(self.repo.get_item(id)?)
    }

    pub fn list_active_items(&self) -> ItemServiceResult<Vec<ScheduleItem>> {
        Ok(self.repo.fetch_active_items()?)
    }

    /// Archives an item; its instances are kept but no new ones are created.
    pub fn archive_item(&self, id: ItemId) -> ItemServiceResult<()> {
        self.repo.archive_item(id)?;
        info!("event=item_archive module=item status=ok item_uuid={id}");
        Ok(())
    }

    /// Moves an instance to `status`.
    ///
    /// `note` is stored only for `SkippedWithNote`.
    pub fn update_instance_status(
        &self,
        id: InstanceId,
        status: CompletionState,
        note: Option<&str>,
    ) -> ItemServiceResult<Instance> {
        let mut instance = self
            .repo
            .get_instance(id)?
            .ok_or(ItemServiceError::InstanceNotFound(id))?;
        instance.apply_status(status, note, calendar::now_epoch_ms());
        self.repo.update_instance(&instance)?;
        Ok(instance)
    }

    fn persist(&self, item: ScheduleItem) -> ItemServiceResult<ScheduleItem> {
        let id = self.repo.create_item(&item)?;
        let stored = self
            .repo
            .get_item(id)?
            .ok_or(ItemServiceError::InconsistentState(
                "created item not found in read-back",
            ))?;
        info!(
            "event=item_create module=item status=ok kind={:?} item_uuid={}",
            stored.kind, stored.uuid
        );
        Ok(stored)
    }
}

fn normalize_title(title: &str) -> ItemServiceResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ItemServiceError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}
