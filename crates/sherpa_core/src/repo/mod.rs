//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the persistence collaborator the scheduling core depends on.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes enforce `ScheduleItem::validate()` before persistence.
//! - Repository APIs return semantic errors (`ItemNotFound`,
//!   `InstanceNotFound`) in addition to DB transport errors.

pub mod schedule_repo;
