//! Event definitions and types.
//!
//! All state in codetrace is derived from events. Events are immutable,
//! append-only, and form the single source of truth: every character typed
//! or removed and every file-system change is one event. The only component
//! allowed to produce adjusted copies of past events is the replay filter,
//! and it always emits new event objects rather than editing history.

use crate::core::error::{CodetraceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Escape token recorded in place of a line feed.
pub const NEWLINE_TOKEN: &str = "NEWLINE";
/// Escape token recorded in place of a carriage-return/line-feed pair.
pub const CRLF_TOKEN: &str = "CR-LF";
/// Escape token recorded in place of a tab.
pub const TAB_TOKEN: &str = "TAB";

const fn default_relevant() -> bool {
    true
}

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new unique event ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One logical character as recorded on the wire.
///
/// Non-printable characters cross the event boundary as fixed string tokens;
/// collaborators that talk to a live editor buffer are responsible for the
/// token-to-literal conversion in the other direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharToken {
    /// A printable character, recorded as itself.
    Literal(char),
    /// A line feed, recorded as [`NEWLINE_TOKEN`].
    Newline,
    /// A carriage-return/line-feed pair, recorded as [`CRLF_TOKEN`].
    CrLf,
    /// A tab, recorded as [`TAB_TOKEN`].
    Tab,
}

impl CharToken {
    /// Escapes a literal character into its token form.
    #[must_use]
    pub fn from_literal(ch: char) -> Self {
        match ch {
            '\n' => Self::Newline,
            '\t' => Self::Tab,
            other => Self::Literal(other),
        }
    }

    /// Parses the escaped wire form of a token.
    ///
    /// # Errors
    /// Returns a precondition error for a multi-character string that is not
    /// one of the fixed escape tokens.
    pub fn unescape(text: &str) -> Result<Self> {
        match text {
            NEWLINE_TOKEN => Ok(Self::Newline),
            CRLF_TOKEN => Ok(Self::CrLf),
            TAB_TOKEN => Ok(Self::Tab),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Ok(Self::Literal(ch)),
                    _ => Err(CodetraceError::precondition(
                        "invalid_char_token",
                        format!("Not a single character or escape token: {other:?}"),
                        "core:events",
                    )),
                }
            }
        }
    }

    /// Returns the escaped wire form.
    #[must_use]
    pub fn escaped(&self) -> String {
        match self {
            Self::Literal(ch) => ch.to_string(),
            Self::Newline => NEWLINE_TOKEN.to_string(),
            Self::CrLf => CRLF_TOKEN.to_string(),
            Self::Tab => TAB_TOKEN.to_string(),
        }
    }

    /// Returns the literal text this token reconstructs to.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Literal(ch) => ch.to_string(),
            Self::Newline => "\n".to_string(),
            Self::CrLf => "\r\n".to_string(),
            Self::Tab => "\t".to_string(),
        }
    }

    /// Whether this token terminates a row.
    #[must_use]
    pub fn is_line_break(&self) -> bool {
        matches!(self, Self::Newline | Self::CrLf)
    }
}

impl Serialize for CharToken {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.escaped())
    }
}

impl<'de> Deserialize<'de> for CharToken {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::unescape(&text).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for CharToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.escaped())
    }
}

/// Opaque provenance attached to every event.
///
/// The core stores and forwards both ids but never interprets them; the
/// attribution collaborator owns their meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Branch this event was recorded on.
    pub branch_id: Uuid,
    /// Who or what group caused the event.
    pub attribution_id: Uuid,
}

impl Provenance {
    /// Creates provenance for a branch and attribution pair.
    #[must_use]
    pub fn new(branch_id: Uuid, attribution_id: Uuid) -> Self {
        Self {
            branch_id,
            attribution_id,
        }
    }
}

/// Event metadata common to all events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub id: EventId,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Sequence number within the event stream (assigned by store).
    pub sequence: Option<u64>,
    /// Branch and attribution provenance.
    pub provenance: Provenance,
    /// Whether the event participates in playback animation. Bookkeeping
    /// events (the initial root-directory creation) carry `false` but are
    /// still required for reconstruction.
    #[serde(default = "default_relevant")]
    pub relevant: bool,
}

impl EventMetadata {
    /// Creates new metadata with current timestamp.
    #[must_use]
    pub fn new(provenance: Provenance) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            sequence: None,
            provenance,
            relevant: true,
        }
    }
}

/// Payload types for different events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A new file was created.
    FileCreated {
        file_id: Uuid,
        path: String,
        parent_id: Uuid,
    },
    /// A file was deleted.
    FileDeleted {
        file_id: Uuid,
        path: String,
        parent_id: Uuid,
    },
    /// A file was moved to a different parent directory.
    FileMoved {
        file_id: Uuid,
        old_path: String,
        new_path: String,
        old_parent_id: Uuid,
        new_parent_id: Uuid,
    },
    /// A file was renamed in place.
    FileRenamed {
        file_id: Uuid,
        old_path: String,
        new_path: String,
        parent_id: Uuid,
    },
    /// A new directory was created. `parent_id` is `None` only for the
    /// project root.
    DirectoryCreated {
        directory_id: Uuid,
        path: String,
        parent_id: Option<Uuid>,
    },
    /// A directory was deleted. Producers delete descendants first, one
    /// event per entity.
    DirectoryDeleted {
        directory_id: Uuid,
        path: String,
        parent_id: Option<Uuid>,
    },
    /// A directory was moved to a different parent directory.
    DirectoryMoved {
        directory_id: Uuid,
        old_path: String,
        new_path: String,
        old_parent_id: Uuid,
        new_parent_id: Uuid,
    },
    /// A directory was renamed in place.
    DirectoryRenamed {
        directory_id: Uuid,
        old_path: String,
        new_path: String,
        parent_id: Option<Uuid>,
    },
    /// A single logical character was inserted.
    ///
    /// `line` and `column` are 1-based positions at the moment of insertion;
    /// `predecessor_id` references the character immediately preceding the
    /// new one (`None` for start of file). Positions are transient, the
    /// predecessor reference is not.
    CharInserted {
        file_id: Uuid,
        token: CharToken,
        line: u64,
        column: u64,
        predecessor_id: Option<EventId>,
        /// Id of the original insert this character was copied from.
        #[serde(default)]
        pasted_from: Option<EventId>,
    },
    /// A single logical character was deleted.
    ///
    /// `target_id` references the `CharInserted` event being removed; the
    /// 1-based `line`/`column` record where the character sat when deleted.
    CharDeleted {
        file_id: Uuid,
        token: CharToken,
        line: u64,
        column: u64,
        target_id: EventId,
    },
}

impl EventPayload {
    /// Returns the file or directory id this payload addresses.
    #[must_use]
    pub fn subject_id(&self) -> Uuid {
        match self {
            Self::FileCreated { file_id, .. }
            | Self::FileDeleted { file_id, .. }
            | Self::FileMoved { file_id, .. }
            | Self::FileRenamed { file_id, .. }
            | Self::CharInserted { file_id, .. }
            | Self::CharDeleted { file_id, .. } => *file_id,
            Self::DirectoryCreated { directory_id, .. }
            | Self::DirectoryDeleted { directory_id, .. }
            | Self::DirectoryMoved { directory_id, .. }
            | Self::DirectoryRenamed { directory_id, .. } => *directory_id,
        }
    }

    /// Whether this payload is a file-system event (as opposed to a
    /// character event).
    #[must_use]
    pub fn is_filesystem(&self) -> bool {
        !matches!(self, Self::CharInserted { .. } | Self::CharDeleted { .. })
    }
}

/// A complete event with metadata and payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event payload.
    pub payload: EventPayload,
}

impl Event {
    /// Creates a new event with the given payload and provenance.
    #[must_use]
    pub fn new(payload: EventPayload, provenance: Provenance) -> Self {
        Self {
            metadata: EventMetadata::new(provenance),
            payload,
        }
    }

    /// Marks the event as excluded from playback animation.
    #[must_use]
    pub fn never_relevant(mut self) -> Self {
        self.metadata.relevant = false;
        self
    }

    /// Returns the event ID.
    #[must_use]
    pub fn id(&self) -> EventId {
        self.metadata.id
    }

    /// Returns the event timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.metadata.timestamp
    }

    /// Returns the store-assigned sequence number, if any.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.metadata.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_unique() {
        let id1 = EventId::new();
        let id2 = EventId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn char_token_escape_roundtrip() {
        for token in [
            CharToken::Literal('x'),
            CharToken::Literal('{'),
            CharToken::Newline,
            CharToken::CrLf,
            CharToken::Tab,
        ] {
            let escaped = token.escaped();
            assert_eq!(CharToken::unescape(&escaped).unwrap(), token);
        }
    }

    #[test]
    fn char_token_rejects_unknown_multichar() {
        assert!(CharToken::unescape("WHAT").is_err());
        assert!(CharToken::unescape("").is_err());
    }

    #[test]
    fn char_token_literal_n_is_not_newline() {
        // The single letter N must not collide with the NEWLINE token.
        assert_eq!(
            CharToken::unescape("N").unwrap(),
            CharToken::Literal('N')
        );
    }

    #[test]
    fn char_token_serializes_as_escape_string() {
        let json = serde_json::to_string(&CharToken::Newline).unwrap();
        assert_eq!(json, "\"NEWLINE\"");
        let back: CharToken = serde_json::from_str("\"TAB\"").unwrap();
        assert_eq!(back, CharToken::Tab);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::new(
            EventPayload::CharInserted {
                file_id: Uuid::new_v4(),
                token: CharToken::CrLf,
                line: 3,
                column: 14,
                predecessor_id: Some(EventId::new()),
                pasted_from: None,
            },
            Provenance::new(Uuid::new_v4(), Uuid::new_v4()),
        );

        let json = serde_json::to_string(&event).expect("serialize");
        let restored: Event = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(event.payload, restored.payload);
        assert!(restored.metadata.relevant);
    }

    #[test]
    fn never_relevant_survives_roundtrip() {
        let event = Event::new(
            EventPayload::DirectoryCreated {
                directory_id: Uuid::new_v4(),
                path: String::new(),
                parent_id: None,
            },
            Provenance::new(Uuid::new_v4(), Uuid::new_v4()),
        )
        .never_relevant();

        let json = serde_json::to_string(&event).expect("serialize");
        let restored: Event = serde_json::from_str(&json).expect("deserialize");
        assert!(!restored.metadata.relevant);
    }

    #[test]
    fn subject_id_covers_all_variants() {
        let file_id = Uuid::new_v4();
        let payload = EventPayload::CharDeleted {
            file_id,
            token: CharToken::Literal('q'),
            line: 1,
            column: 1,
            target_id: EventId::new(),
        };
        assert_eq!(payload.subject_id(), file_id);
        assert!(!payload.is_filesystem());

        let dir_id = Uuid::new_v4();
        let payload = EventPayload::DirectoryRenamed {
            directory_id: dir_id,
            old_path: "src".to_string(),
            new_path: "lib".to_string(),
            parent_id: None,
        };
        assert_eq!(payload.subject_id(), dir_id);
        assert!(payload.is_filesystem());
    }
}
