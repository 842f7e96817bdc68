//! Structured error types.
//!
//! Errors must be classifiable, attributable, and actionable.
//! Every error answers: What failed? Why? What can be done next?

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Precondition violations: the event stream and the reconstructed
    /// state no longer agree. Fatal, never silently clamped.
    Precondition,
    /// A path or id with no live registry entry was referenced.
    NotTracked,
    /// Event store failures (IO, serialization, lock contention).
    Store,
    /// Replay filter failures.
    Filter,
    /// Caller input errors.
    User,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precondition => write!(f, "precondition"),
            Self::NotTracked => write!(f, "not_tracked"),
            Self::Store => write!(f, "store"),
            Self::Filter => write!(f, "filter"),
            Self::User => write!(f, "user"),
        }
    }
}

/// Structured error with full context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodetraceError {
    /// Error category for classification.
    pub category: ErrorCategory,
    /// Unique error code within category.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Component and identifier that originated the error.
    pub origin: String,
    /// Whether this error is potentially recoverable.
    pub recoverable: bool,
    /// Hint for recovery action.
    pub recovery_hint: Option<String>,
    /// Additional context key-value pairs.
    pub context: HashMap<String, String>,
}

impl CodetraceError {
    /// Creates a new error with the given parameters.
    #[must_use]
    pub fn new(
        category: ErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            origin: origin.into(),
            recoverable: false,
            recovery_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets whether the error is recoverable.
    #[must_use]
    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Sets the recovery hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    /// Adds context to the error.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Creates a fatal precondition error. These signal upstream
    /// event-stream corruption and must abort the operation.
    #[must_use]
    pub fn precondition(
        code: impl Into<String>,
        message: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCategory::Precondition, code, message, origin).with_hint(
            "The tracked history and the live file no longer agree; \
             run reconciliation before retrying",
        )
    }

    /// Creates a not-tracked error for an unknown or deleted path.
    #[must_use]
    pub fn not_tracked(
        code: impl Into<String>,
        message: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCategory::NotTracked, code, message, origin).recoverable(true)
    }

    /// Creates a store error.
    #[must_use]
    pub fn store(
        code: impl Into<String>,
        message: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCategory::Store, code, message, origin)
    }

    /// Creates a replay filter error.
    #[must_use]
    pub fn filter(
        code: impl Into<String>,
        message: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCategory::Filter, code, message, origin)
    }

    /// Creates a caller input error.
    #[must_use]
    pub fn user(
        code: impl Into<String>,
        message: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCategory::User, code, message, origin).recoverable(true)
    }
}

impl std::fmt::Display for CodetraceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.category, self.code, self.message)
    }
}

impl std::error::Error for CodetraceError {}

impl From<crate::storage::event_store::EventStoreError> for CodetraceError {
    fn from(err: crate::storage::event_store::EventStoreError) -> Self {
        Self::store("event_store", err.to_string(), "storage:event_store")
    }
}

/// Result type using `CodetraceError`.
pub type Result<T> = std::result::Result<T, CodetraceError>;
