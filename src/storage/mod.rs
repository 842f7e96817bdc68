//! Storage backends for events and registry snapshots.

pub mod event_store;
