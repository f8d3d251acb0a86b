//! Core scheduling logic for Sherpa habits and tasks.
//! This crate is the single source of truth for recurrence and schedule invariants.

pub mod calendar;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schedule;
pub mod service;

pub use calendar::DateRange;
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::instance::{CompletionState, Instance, InstanceId};
pub use model::item::{ItemId, ItemKind, ItemValidationError, ScheduleItem};
pub use model::recurrence::{RecurrenceFrequency, RecurrenceRule, Weekday};
pub use model::repeat::{RepeatConfiguration, RepeatEnd, RepeatPattern};
pub use repo::schedule_repo::{
    InsertReport, RepoError, RepoResult, ScheduleRepository, SqliteScheduleRepository,
};
pub use schedule::materializer::plan_schedule;
pub use service::item_service::{ItemService, ItemServiceError, ItemServiceResult};
pub use service::schedule_service::{
    ScheduleOutcome, ScheduleService, DEFAULT_DAYS_AFTER, DEFAULT_DAYS_BEFORE,
};
pub use service::streak::qualifies_for_streak;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
