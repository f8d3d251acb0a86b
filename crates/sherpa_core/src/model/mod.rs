//! Scheduling domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by the scheduling core.
//! - Keep recurrence evaluation pure and free of storage concerns.
//!
//! # Invariants
//! - Every item and instance is identified by a stable UUID.
//! - Instances reference their owning item by ID; there are no back pointers.
//! - Calendar days are `NaiveDate` values with no time component.

pub mod instance;
pub mod item;
pub mod recurrence;
pub mod repeat;
