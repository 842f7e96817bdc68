//! Codetrace - an event-sourced recorder for source-tree edit history.
//!
//! This crate provides the core engine: the event log, per-file document
//! reconstruction, the path/identity registry, and the replay filter that
//! rewrites history into a "written correctly on the first try" stream.

pub mod core;
pub mod storage;
