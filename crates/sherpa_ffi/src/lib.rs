//! Flutter-facing bindings for the Sherpa scheduling core.

pub mod api;
