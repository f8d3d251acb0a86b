//! Schedule materialization.
//!
//! # Responsibility
//! - Expand recurrence rules and due dates into concrete pending instances.
//!
//! # Invariants
//! - Planning is pure: no I/O, no clock reads, no shared state.
//! - A plan never repeats an `(item, day)` pair already present or planned.

pub mod materializer;
