//! Core domain types: events, documents, the path registry, and the
//! replay filter.
//!
//! This module contains the heart of the recording engine. All state is
//! derived from immutable events, ensuring determinism, idempotency, and
//! complete reconstructability at any historical point.
//!
//! # Architecture
//!
//! ```text
//! Events (immutable) → Reconstruction (derived) → Producers (emit new events)
//! ```
//!
//! # Key Concepts
//!
//! ## Events
//!
//! Events are the single source of truth. They are:
//! - **Immutable**: Once created, never modified in place
//! - **Append-only**: New events are added; corrections are new events
//! - **Ordered**: The store assigns each durable event a dense sequence
//!   number
//!
//! Every event carries both a positional address (1-based line/column at
//! recording time) and a referential one (predecessor and target links by
//! event id). The referential form is what lets the replay filter rewrite
//! history without breaking later events.
//!
//! See [`events`] for [`Event`](events::Event),
//! [`EventPayload`](events::EventPayload), and
//! [`CharToken`](events::CharToken).
//!
//! ## Reconstruction
//!
//! State is derived by replaying events from empty:
//! - [`Document`](document::Document): one file's character grid, each cell
//!   remembering the insert event that produced it
//! - [`PathRegistry`](registry::PathRegistry): identity and live path of
//!   every file and directory, with soft deletion
//! - [`TreeState`](session::TreeState): registry plus documents, the whole
//!   tree at one point in history
//!
//! ## Recording
//!
//! [`Session`](session::Session) is the single sequential producer: each
//! editing call validates against current state, appends exactly one event,
//! and applies it. See [`log`] for the append-only
//! [`EventLog`](log::EventLog) facade over the store.
//!
//! ## The Replay Filter
//!
//! [`filter`] rewrites history for playback: work that was done and undone
//! is collapsed away, surviving events are re-addressed against the
//! filtered reconstruction, and comments anchored to dropped events are
//! reattached. See [`run_filter`](filter::run_filter) and
//! [`FilterStrategy`](filter::FilterStrategy).
//!
//! ## Errors
//!
//! All errors are structured with a category, a code unique within it, a
//! human-readable message, the originating component, and a recovery hint
//! when one applies. See [`error`] for
//! [`CodetraceError`](error::CodetraceError) and [`Result`](error::Result).

pub mod document;
pub mod error;
pub mod events;
pub mod filter;
pub mod log;
pub mod order_key;
pub mod registry;
pub mod session;
