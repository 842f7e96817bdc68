//! Recording session: the sequential apply loop.
//!
//! A [`Session`] is the single logical producer of the event log. Editing
//! activity calls the producer methods, which validate against the current
//! state, append one event, apply the durable event to the document model
//! and the registry, and persist the touched registry snapshots - strictly
//! in that order, one event at a time. Replaying the log from empty state
//! through the same apply path materializes any historical point.

use crate::core::document::Document;
use crate::core::error::{CodetraceError, Result};
use crate::core::events::{CharToken, Event, EventId, EventPayload, Provenance};
use crate::core::log::EventLog;
use crate::core::registry::{parent_path, PathRegistry, PathUpdate};
use crate::storage::event_store::SharedEventStore;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const ORIGIN: &str = "core:session";

/// Collaborator supplying the opaque attribution id stamped on each event.
/// The core stores and forwards the id but never interprets it.
pub trait AttributionSource: Send + Sync {
    /// Returns the attribution id for the next event.
    fn attribution_id(&self) -> Uuid;
}

/// Attribution source that always answers with one fixed id.
#[derive(Debug, Clone, Copy)]
pub struct FixedAttribution {
    id: Uuid,
}

impl FixedAttribution {
    /// Creates a source for a single author or group.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }
}

impl AttributionSource for FixedAttribution {
    fn attribution_id(&self) -> Uuid {
        self.id
    }
}

/// The reconstructed state of the whole tree at one point in history:
/// the path registry plus one materialized document per file.
#[derive(Debug, Clone, Default)]
pub struct TreeState {
    registry: PathRegistry,
    documents: HashMap<Uuid, Document>,
}

impl TreeState {
    /// Creates the empty pre-history state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replays an ordered event sequence from empty state.
    ///
    /// # Errors
    /// Surfaces the first apply error; these indicate a corrupted stream.
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a Event>) -> Result<Self> {
        let mut state = Self::new();
        for event in events {
            state.apply_event(event)?;
        }
        Ok(state)
    }

    /// Applies one event, returning the registry entries it touched.
    ///
    /// # Errors
    /// Fails when the event does not fit the current state; see the
    /// document and registry apply rules.
    pub fn apply_event(&mut self, event: &Event) -> Result<Vec<PathUpdate>> {
        if event.payload.is_filesystem() {
            let updates = self.registry.apply(event)?;
            if let EventPayload::FileCreated { file_id, .. } = &event.payload {
                self.documents.insert(*file_id, Document::new(*file_id));
            }
            return Ok(updates);
        }

        let file_id = event.payload.subject_id();
        match self.registry.file(file_id) {
            Some(file) if !file.is_deleted => {}
            _ => {
                return Err(CodetraceError::precondition(
                    "file_not_live",
                    format!("Character event addresses file {file_id} which is not live"),
                    ORIGIN,
                ))
            }
        }
        let document = self.documents.get_mut(&file_id).ok_or_else(|| {
            CodetraceError::precondition(
                "document_missing",
                format!("No document materialized for file {file_id}"),
                ORIGIN,
            )
        })?;
        document.apply(event)?;
        Ok(Vec::new())
    }

    /// Returns the registry view of this state.
    #[must_use]
    pub fn registry(&self) -> &PathRegistry {
        &self.registry
    }

    /// Returns the materialized document of a file, if one exists.
    #[must_use]
    pub fn document(&self, file_id: Uuid) -> Option<&Document> {
        self.documents.get(&file_id)
    }

    /// Returns the reconstructed text of the file at a live path.
    ///
    /// # Errors
    /// Fails with a not-tracked error if the path has no live file.
    pub fn file_text(&self, path: &str) -> Result<String> {
        let file_id = self.registry.file_id(path).ok_or_else(|| {
            CodetraceError::not_tracked(
                "unknown_path",
                format!("No live file at {path:?}"),
                ORIGIN,
            )
        })?;
        Ok(self
            .documents
            .get(&file_id)
            .map(Document::full_text)
            .unwrap_or_default())
    }
}

/// A live recording session over one event store.
pub struct Session {
    log: EventLog,
    state: TreeState,
    branch_id: Uuid,
    attribution: Arc<dyn AttributionSource>,
}

impl Session {
    /// Starts recording into an empty store, creating the project root
    /// directory as a bookkeeping event excluded from playback animation.
    ///
    /// # Errors
    /// Fails if the store already holds events or is unavailable.
    pub fn init(
        store: SharedEventStore,
        branch_id: Uuid,
        attribution: Arc<dyn AttributionSource>,
    ) -> Result<Self> {
        if !store.read_all()?.is_empty() {
            return Err(CodetraceError::user(
                "store_not_empty",
                "Refusing to initialize over an existing history; open it instead",
                ORIGIN,
            ));
        }

        let mut session = Self {
            log: EventLog::new(store),
            state: TreeState::new(),
            branch_id,
            attribution,
        };
        let root = Event::new(
            EventPayload::DirectoryCreated {
                directory_id: Uuid::new_v4(),
                path: String::new(),
                parent_id: None,
            },
            session.provenance(),
        )
        .never_relevant();
        session.commit(root)?;
        Ok(session)
    }

    /// Resumes recording over an existing history by replaying it from
    /// empty state.
    ///
    /// # Errors
    /// Fails if the store is empty, unavailable, or holds a corrupted
    /// stream.
    pub fn open(
        store: SharedEventStore,
        branch_id: Uuid,
        attribution: Arc<dyn AttributionSource>,
    ) -> Result<Self> {
        let events = store.read_all()?;
        if events.is_empty() {
            return Err(CodetraceError::user(
                "store_empty",
                "No recorded history to open; initialize a session instead",
                ORIGIN,
            ));
        }
        let state = TreeState::replay(&events)?;
        Ok(Self {
            log: EventLog::new(store),
            state,
            branch_id,
            attribution,
        })
    }

    /// Returns the current reconstructed state.
    #[must_use]
    pub fn state(&self) -> &TreeState {
        &self.state
    }

    /// Returns the underlying event log.
    #[must_use]
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Reads the full event history in sequence order.
    ///
    /// # Errors
    /// Fails if the store is unavailable.
    pub fn events(&self) -> Result<Vec<Event>> {
        self.log.events()
    }

    /// Returns the reconstructed text of the file at a live path.
    ///
    /// # Errors
    /// Fails with a not-tracked error if the path has no live file.
    pub fn file_text(&self, path: &str) -> Result<String> {
        self.state.file_text(path)
    }

    /// Materializes the tree as it stood after the event with the given
    /// sequence number was applied.
    ///
    /// # Errors
    /// Fails if the store is unavailable or the prefix does not replay.
    pub fn materialize_at(&self, sequence: u64) -> Result<TreeState> {
        let events = self.log.events()?;
        TreeState::replay(
            events
                .iter()
                .filter(|e| e.sequence().is_some_and(|s| s <= sequence)),
        )
    }

    /// Starts tracking a new file.
    ///
    /// # Errors
    /// Fails if the parent directory is not live or the path is taken.
    pub fn create_file(&mut self, path: &str) -> Result<Event> {
        self.ensure_path_free(path)?;
        let parent_id = self.live_directory(parent_path(path))?;
        self.commit(Event::new(
            EventPayload::FileCreated {
                file_id: Uuid::new_v4(),
                path: path.to_string(),
                parent_id,
            },
            self.provenance(),
        ))
    }

    /// Starts tracking a new directory.
    ///
    /// # Errors
    /// Fails if the parent directory is not live or the path is taken.
    pub fn create_directory(&mut self, path: &str) -> Result<Event> {
        if path.is_empty() {
            return Err(CodetraceError::user(
                "root_already_exists",
                "The project root is created when the session is initialized",
                ORIGIN,
            ));
        }
        self.ensure_path_free(path)?;
        let parent_id = self.live_directory(parent_path(path))?;
        self.commit(Event::new(
            EventPayload::DirectoryCreated {
                directory_id: Uuid::new_v4(),
                path: path.to_string(),
                parent_id: Some(parent_id),
            },
            self.provenance(),
        ))
    }

    /// Deletes the file at a live path.
    ///
    /// # Errors
    /// Fails with a not-tracked error if the path has no live file.
    pub fn delete_file(&mut self, path: &str) -> Result<Event> {
        let file_id = self.live_file(path)?;
        let parent_id = self
            .state
            .registry()
            .file(file_id)
            .expect("live id resolves")
            .parent_id;
        self.commit(Event::new(
            EventPayload::FileDeleted {
                file_id,
                path: path.to_string(),
                parent_id,
            },
            self.provenance(),
        ))
    }

    /// Deletes a directory and everything beneath it, deepest entries
    /// first, one event per entity.
    ///
    /// # Errors
    /// Fails with a not-tracked error if the path has no live directory.
    pub fn delete_directory(&mut self, path: &str) -> Result<Vec<Event>> {
        let directory_id = self.live_directory(path)?;
        let prefix = format!("{path}/");

        let mut doomed: Vec<(String, bool)> = Vec::new();
        for file in self.state.registry().live_files() {
            if file.path.starts_with(&prefix) {
                doomed.push((file.path.clone(), false));
            }
        }
        for directory in self.state.registry().live_directories() {
            if directory.path.starts_with(&prefix) {
                doomed.push((directory.path.clone(), true));
            }
        }
        // Deepest first; files before the directory that holds them.
        doomed.sort_by_key(|(entry_path, is_dir)| {
            (std::cmp::Reverse(entry_path.matches('/').count()), *is_dir)
        });

        let mut events = Vec::with_capacity(doomed.len() + 1);
        for (entry_path, is_dir) in doomed {
            if is_dir {
                let id = self.live_directory(&entry_path)?;
                let parent_id = self
                    .state
                    .registry()
                    .directory(id)
                    .expect("live id resolves")
                    .parent_id;
                events.push(self.commit(Event::new(
                    EventPayload::DirectoryDeleted {
                        directory_id: id,
                        path: entry_path,
                        parent_id,
                    },
                    self.provenance(),
                ))?);
            } else {
                events.push(self.delete_file(&entry_path)?);
            }
        }

        let parent_id = self
            .state
            .registry()
            .directory(directory_id)
            .expect("live id resolves")
            .parent_id;
        events.push(self.commit(Event::new(
            EventPayload::DirectoryDeleted {
                directory_id,
                path: path.to_string(),
                parent_id,
            },
            self.provenance(),
        ))?);
        Ok(events)
    }

    /// Renames a file within its parent directory.
    ///
    /// # Errors
    /// Fails if the old path is not live or the new path is invalid.
    pub fn rename_file(&mut self, old_path: &str, new_path: &str) -> Result<Event> {
        self.ensure_path_free(new_path)?;
        let file_id = self.live_file(old_path)?;
        let parent_id = self
            .state
            .registry()
            .file(file_id)
            .expect("live id resolves")
            .parent_id;
        self.commit(Event::new(
            EventPayload::FileRenamed {
                file_id,
                old_path: old_path.to_string(),
                new_path: new_path.to_string(),
                parent_id,
            },
            self.provenance(),
        ))
    }

    /// Moves a file to a different parent directory.
    ///
    /// # Errors
    /// Fails if either path is invalid or the new parent is not live.
    pub fn move_file(&mut self, old_path: &str, new_path: &str) -> Result<Event> {
        self.ensure_path_free(new_path)?;
        let file_id = self.live_file(old_path)?;
        let old_parent_id = self
            .state
            .registry()
            .file(file_id)
            .expect("live id resolves")
            .parent_id;
        let new_parent_id = self.live_directory(parent_path(new_path))?;
        self.commit(Event::new(
            EventPayload::FileMoved {
                file_id,
                old_path: old_path.to_string(),
                new_path: new_path.to_string(),
                old_parent_id,
                new_parent_id,
            },
            self.provenance(),
        ))
    }

    /// Renames a directory within its parent; descendant paths cascade.
    ///
    /// # Errors
    /// Fails if the old path is not live or the new path is invalid.
    pub fn rename_directory(&mut self, old_path: &str, new_path: &str) -> Result<Event> {
        self.ensure_path_free(new_path)?;
        let directory_id = self.live_directory(old_path)?;
        let parent_id = self
            .state
            .registry()
            .directory(directory_id)
            .expect("live id resolves")
            .parent_id;
        self.commit(Event::new(
            EventPayload::DirectoryRenamed {
                directory_id,
                old_path: old_path.to_string(),
                new_path: new_path.to_string(),
                parent_id,
            },
            self.provenance(),
        ))
    }

    /// Moves a directory to a different parent; descendant paths cascade.
    ///
    /// # Errors
    /// Fails if either path is invalid, the new parent is not live, or the
    /// directory is the project root.
    pub fn move_directory(&mut self, old_path: &str, new_path: &str) -> Result<Event> {
        self.ensure_path_free(new_path)?;
        let directory_id = self.live_directory(old_path)?;
        let Some(old_parent_id) = self
            .state
            .registry()
            .directory(directory_id)
            .expect("live id resolves")
            .parent_id
        else {
            return Err(CodetraceError::user(
                "cannot_move_root",
                "The project root cannot be moved",
                ORIGIN,
            ));
        };
        let new_parent_id = self.live_directory(parent_path(new_path))?;
        self.commit(Event::new(
            EventPayload::DirectoryMoved {
                directory_id,
                old_path: old_path.to_string(),
                new_path: new_path.to_string(),
                old_parent_id,
                new_parent_id,
            },
            self.provenance(),
        ))
    }

    /// Inserts one character at a 0-based row/column of a live file.
    ///
    /// # Errors
    /// Fails if the path is not live or the position is invalid.
    pub fn insert(
        &mut self,
        path: &str,
        token: CharToken,
        row: usize,
        col: usize,
    ) -> Result<Event> {
        self.insert_inner(path, token, row, col, None)
    }

    /// Inserts one character copied from an earlier insert, preserving
    /// paste provenance.
    ///
    /// # Errors
    /// Fails if the path is not live or the position is invalid.
    pub fn insert_pasted(
        &mut self,
        path: &str,
        token: CharToken,
        row: usize,
        col: usize,
        pasted_from: EventId,
    ) -> Result<Event> {
        self.insert_inner(path, token, row, col, Some(pasted_from))
    }

    /// Types a run of literal text starting at a 0-based row/column,
    /// emitting one insert event per character.
    ///
    /// # Errors
    /// Fails on the first invalid position.
    pub fn type_text(
        &mut self,
        path: &str,
        mut row: usize,
        mut col: usize,
        text: &str,
    ) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for ch in text.chars() {
            let token = CharToken::from_literal(ch);
            events.push(self.insert(path, token, row, col)?);
            if token.is_line_break() {
                row += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        Ok(events)
    }

    /// Deletes the character at a 0-based row/column of a live file.
    ///
    /// # Errors
    /// Fails if the path is not live or no character sits at the position.
    pub fn delete(&mut self, path: &str, row: usize, col: usize) -> Result<Event> {
        let file_id = self.live_file(path)?;
        let document = self.document(file_id)?;
        let record = document.record_at(row, col).ok_or_else(|| {
            CodetraceError::precondition(
                "delete_out_of_bounds",
                format!("No character at ({row}, {col}) in {path:?}"),
                ORIGIN,
            )
        })?;
        let payload = EventPayload::CharDeleted {
            file_id,
            token: record.token,
            line: row as u64 + 1,
            column: col as u64 + 1,
            target_id: record.event_id,
        };
        self.commit(Event::new(payload, self.provenance()))
    }

    /// Installs a rewritten history produced by the replay filter.
    ///
    /// The replacement is validated by a full replay first; on any error
    /// the original log is left untouched. This call must be serialized
    /// against appends, which it is by holding `&mut self`.
    ///
    /// # Errors
    /// Fails if the rewritten history does not replay or the store is
    /// unavailable.
    pub fn install_filtered(&mut self, events: Vec<Event>) -> Result<()> {
        let state = TreeState::replay(&events)?;
        self.log.replace_all(events)?;
        self.state = state;

        let store = self.log.store();
        for file in self.state.registry().files() {
            store.save_file_snapshot(file.clone())?;
        }
        for directory in self.state.registry().directories() {
            store.save_directory_snapshot(directory.clone())?;
        }
        Ok(())
    }

    fn insert_inner(
        &mut self,
        path: &str,
        token: CharToken,
        row: usize,
        col: usize,
        pasted_from: Option<EventId>,
    ) -> Result<Event> {
        let file_id = self.live_file(path)?;
        let predecessor_id = self.document(file_id)?.predecessor_id_at(row, col)?;
        let payload = EventPayload::CharInserted {
            file_id,
            token,
            line: row as u64 + 1,
            column: col as u64 + 1,
            predecessor_id,
            pasted_from,
        };
        self.commit(Event::new(payload, self.provenance()))
    }

    /// Appends one event and applies it; the single sequential write path
    /// for the whole session.
    fn commit(&mut self, event: Event) -> Result<Event> {
        let durable = self.log.append(event)?;
        let updates = self.state.apply_event(&durable)?;
        let store = self.log.store();
        for update in updates {
            match update {
                PathUpdate::File(file) => store.save_file_snapshot(file)?,
                PathUpdate::Directory(directory) => store.save_directory_snapshot(directory)?,
            }
        }
        Ok(durable)
    }

    fn provenance(&self) -> Provenance {
        Provenance::new(self.branch_id, self.attribution.attribution_id())
    }

    fn ensure_path_free(&self, path: &str) -> Result<()> {
        let registry = self.state.registry();
        if registry.file_id(path).is_some() || registry.directory_id(path).is_some() {
            return Err(CodetraceError::user(
                "path_already_tracked",
                format!("A live entry already exists at {path:?}"),
                ORIGIN,
            )
            .with_context("path", path));
        }
        Ok(())
    }

    fn live_file(&self, path: &str) -> Result<Uuid> {
        self.state.registry().file_id(path).ok_or_else(|| {
            CodetraceError::not_tracked(
                "unknown_path",
                format!("No live file at {path:?}"),
                ORIGIN,
            )
            .with_context("path", path)
        })
    }

    fn live_directory(&self, path: &str) -> Result<Uuid> {
        self.state.registry().directory_id(path).ok_or_else(|| {
            CodetraceError::not_tracked(
                "unknown_path",
                format!("No live directory at {path:?}"),
                ORIGIN,
            )
            .with_context("path", path)
        })
    }

    fn document(&self, file_id: Uuid) -> Result<&Document> {
        self.state.document(file_id).ok_or_else(|| {
            CodetraceError::precondition(
                "document_missing",
                format!("No document materialized for file {file_id}"),
                ORIGIN,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::event_store::InMemoryEventStore;

    fn session() -> Session {
        let store: SharedEventStore = Arc::new(InMemoryEventStore::new());
        Session::init(
            store,
            Uuid::new_v4(),
            Arc::new(FixedAttribution::new(Uuid::new_v4())),
        )
        .unwrap()
    }

    #[test]
    fn init_records_never_relevant_root() {
        let session = session();
        let events = session.events().unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].metadata.relevant);
        assert!(session.state().registry().directory_id("").is_some());
    }

    #[test]
    fn init_refuses_existing_history() {
        let store: SharedEventStore = Arc::new(InMemoryEventStore::new());
        let attribution = Arc::new(FixedAttribution::new(Uuid::new_v4()));
        let _first = Session::init(store.clone(), Uuid::new_v4(), attribution.clone()).unwrap();
        assert!(Session::init(store, Uuid::new_v4(), attribution).is_err());
    }

    #[test]
    fn record_and_read_back_text() {
        let mut session = session();
        session.create_directory("src").unwrap();
        session.create_file("src/main.rs").unwrap();
        session.type_text("src/main.rs", 0, 0, "fn main() {}\n").unwrap();

        assert_eq!(session.file_text("src/main.rs").unwrap(), "fn main() {}\n");
    }

    #[test]
    fn reopen_replays_identical_state() {
        let store: SharedEventStore = Arc::new(InMemoryEventStore::new());
        let attribution = Arc::new(FixedAttribution::new(Uuid::new_v4()));
        let branch = Uuid::new_v4();

        {
            let mut session = Session::init(store.clone(), branch, attribution.clone()).unwrap();
            session.create_file("notes.txt").unwrap();
            session.type_text("notes.txt", 0, 0, "alpha\nbeta").unwrap();
            session.delete("notes.txt", 0, 4).unwrap();
        }

        let reopened = Session::open(store, branch, attribution).unwrap();
        assert_eq!(reopened.file_text("notes.txt").unwrap(), "alph\nbeta");
    }

    #[test]
    fn materialize_at_walks_history() {
        let mut session = session();
        session.create_file("a.txt").unwrap();
        let events = session.type_text("a.txt", 0, 0, "abc").unwrap();

        let midpoint = events[1].sequence().unwrap();
        let state = session.materialize_at(midpoint).unwrap();
        assert_eq!(state.file_text("a.txt").unwrap(), "ab");

        let beginning = session.materialize_at(0).unwrap();
        assert!(beginning.file_text("a.txt").is_err());
    }

    #[test]
    fn insert_records_predecessor_and_one_based_position() {
        let mut session = session();
        session.create_file("a.txt").unwrap();
        let events = session.type_text("a.txt", 0, 0, "hi").unwrap();

        let EventPayload::CharInserted {
            line,
            column,
            predecessor_id,
            ..
        } = &events[1].payload
        else {
            panic!("expected insert");
        };
        assert_eq!((*line, *column), (1, 2));
        assert_eq!(*predecessor_id, Some(events[0].id()));
    }

    #[test]
    fn paste_preserves_provenance() {
        let mut session = session();
        session.create_file("a.txt").unwrap();
        let typed = session.type_text("a.txt", 0, 0, "x").unwrap();
        let pasted = session
            .insert_pasted("a.txt", CharToken::Literal('x'), 0, 1, typed[0].id())
            .unwrap();

        let EventPayload::CharInserted { pasted_from, .. } = &pasted.payload else {
            panic!("expected insert");
        };
        assert_eq!(*pasted_from, Some(typed[0].id()));
    }

    #[test]
    fn delete_directory_removes_descendants_deepest_first() {
        let mut session = session();
        session.create_directory("src").unwrap();
        session.create_directory("src/util").unwrap();
        session.create_file("src/lib.rs").unwrap();
        session.create_file("src/util/io.rs").unwrap();

        let events = session.delete_directory("src").unwrap();
        assert_eq!(events.len(), 4);
        // The directory itself goes last.
        assert!(matches!(
            events.last().unwrap().payload,
            EventPayload::DirectoryDeleted { ref path, .. } if path == "src"
        ));
        assert_eq!(session.state().registry().directory_id("src"), None);
        assert_eq!(session.state().registry().file_id("src/util/io.rs"), None);
    }

    #[test]
    fn insert_into_deleted_file_is_not_tracked() {
        let mut session = session();
        session.create_file("a.txt").unwrap();
        session.type_text("a.txt", 0, 0, "x").unwrap();
        session.delete_file("a.txt").unwrap();

        let err = session.insert("a.txt", CharToken::Literal('y'), 0, 1).unwrap_err();
        assert!(err.recoverable); // unknown path, resolved by reconciliation
    }

    #[test]
    fn failed_append_precondition_keeps_log_unchanged() {
        let mut session = session();
        session.create_file("a.txt").unwrap();
        let before = session.events().unwrap().len();

        assert!(session.insert("a.txt", CharToken::Literal('x'), 3, 0).is_err());
        assert_eq!(session.events().unwrap().len(), before);
    }

    #[test]
    fn idempotent_replay_for_any_recorded_order() {
        // The same final text typed three different ways replays to the
        // same reconstruction every time.
        let scripts: [&[(usize, usize, char)]; 3] = [
            &[(0, 0, 'a'), (0, 1, 'b'), (0, 2, 'c'), (0, 3, '\n'), (1, 0, 'd')],
            &[(0, 0, 'd'), (0, 0, '\n'), (0, 0, 'c'), (0, 0, 'b'), (0, 0, 'a')],
            &[(0, 0, 'b'), (0, 1, '\n'), (1, 0, 'd'), (0, 0, 'a'), (0, 2, 'c')],
        ];

        for script in scripts {
            let store: SharedEventStore = Arc::new(InMemoryEventStore::new());
            let attribution = Arc::new(FixedAttribution::new(Uuid::new_v4()));
            let mut session = Session::init(store, Uuid::new_v4(), attribution).unwrap();
            session.create_file("a.txt").unwrap();
            for (row, col, ch) in script {
                session
                    .insert("a.txt", CharToken::from_literal(*ch), *row, *col)
                    .unwrap();
            }
            assert_eq!(session.file_text("a.txt").unwrap(), "abc\nd");

            let replayed = TreeState::replay(&session.events().unwrap()).unwrap();
            assert_eq!(replayed.file_text("a.txt").unwrap(), "abc\nd");
        }
    }
}
