//! `EventStore` trait and implementations.
//!
//! Event stores are the persistence layer for events and registry
//! snapshots. All state is derived from events, so the event store is the
//! single source of truth. The core is oblivious to the backing medium; it
//! only requires the operations here to be durable once they return.

use crate::core::events::Event;
use crate::core::registry::{TrackedDirectory, TrackedFile};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Errors that can occur in the event store.
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store at {path} is locked by another recorder")]
    Locked { path: PathBuf },
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;

/// Trait for event storage backends.
///
/// The store owns sequence assignment: `append` stamps the next number and
/// `replace_all` renumbers the given events densely from zero. The log is
/// single-writer; implementations must not reorder or batch appends.
pub trait EventStore: Send + Sync {
    /// Appends an event, assigning the next sequence number. Nothing is
    /// recorded if the operation fails.
    fn append(&self, event: Event) -> Result<Event>;

    /// Reads all events in sequence order.
    fn read_all(&self) -> Result<Vec<Event>>;

    /// Replaces the whole log with a rewritten history, reassigning dense
    /// sequence numbers `0..N-1` in the given order. Used only when
    /// installing a replay-filter result.
    fn replace_all(&self, events: Vec<Event>) -> Result<Vec<Event>>;

    /// Persists the registry snapshot of one file.
    fn save_file_snapshot(&self, file: TrackedFile) -> Result<()>;

    /// Persists the registry snapshot of one directory.
    fn save_directory_snapshot(&self, directory: TrackedDirectory) -> Result<()>;

    /// Reads the registry snapshot of one file, deleted entries included.
    fn file_snapshot(&self, id: Uuid) -> Result<Option<TrackedFile>>;

    /// Reads the registry snapshot of one directory, deleted entries
    /// included.
    fn directory_snapshot(&self, id: Uuid) -> Result<Option<TrackedDirectory>>;

    /// Reads all file snapshots.
    fn all_files(&self) -> Result<Vec<TrackedFile>>;

    /// Reads all directory snapshots.
    fn all_directories(&self) -> Result<Vec<TrackedDirectory>>;
}

/// Thread-safe handle to any event store.
pub type SharedEventStore = Arc<dyn EventStore>;

/// In-memory event store for tests and filter scratch work.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<Event>>,
    files: RwLock<HashMap<Uuid, TrackedFile>>,
    directories: RwLock<HashMap<Uuid, TrackedDirectory>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::significant_drop_tightening)]
impl EventStore for InMemoryEventStore {
    fn append(&self, mut event: Event) -> Result<Event> {
        let mut events = self.events.write().expect("lock poisoned");
        event.metadata.sequence = Some(events.len() as u64);
        events.push(event.clone());
        Ok(event)
    }

    fn read_all(&self) -> Result<Vec<Event>> {
        let events = self.events.read().expect("lock poisoned");
        Ok(events.clone())
    }

    fn replace_all(&self, mut events: Vec<Event>) -> Result<Vec<Event>> {
        for (index, event) in events.iter_mut().enumerate() {
            event.metadata.sequence = Some(index as u64);
        }
        let mut current = self.events.write().expect("lock poisoned");
        *current = events.clone();
        Ok(events)
    }

    fn save_file_snapshot(&self, file: TrackedFile) -> Result<()> {
        self.files
            .write()
            .expect("lock poisoned")
            .insert(file.id, file);
        Ok(())
    }

    fn save_directory_snapshot(&self, directory: TrackedDirectory) -> Result<()> {
        self.directories
            .write()
            .expect("lock poisoned")
            .insert(directory.id, directory);
        Ok(())
    }

    fn file_snapshot(&self, id: Uuid) -> Result<Option<TrackedFile>> {
        Ok(self.files.read().expect("lock poisoned").get(&id).cloned())
    }

    fn directory_snapshot(&self, id: Uuid) -> Result<Option<TrackedDirectory>> {
        Ok(self
            .directories
            .read()
            .expect("lock poisoned")
            .get(&id)
            .cloned())
    }

    fn all_files(&self) -> Result<Vec<TrackedFile>> {
        Ok(self
            .files
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect())
    }

    fn all_directories(&self) -> Result<Vec<TrackedDirectory>> {
        Ok(self
            .directories
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotFile {
    files: Vec<TrackedFile>,
    directories: Vec<TrackedDirectory>,
}

/// File-based event store: append-only JSON lines for events plus a JSON
/// snapshot document for registry state.
///
/// Opening the store takes an exclusive advisory lock, enforcing the
/// single-writer contract across processes. The lock is released when the
/// store is dropped.
#[derive(Debug)]
pub struct FileEventStore {
    events_path: PathBuf,
    snapshots_path: PathBuf,
    _lock: File,
    events: RwLock<Vec<Event>>,
    files: RwLock<HashMap<Uuid, TrackedFile>>,
    directories: RwLock<HashMap<Uuid, TrackedDirectory>>,
}

impl FileEventStore {
    /// Creates or opens a file-based event store rooted at `dir`.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be prepared, the lock is
    /// held by another recorder, or existing data cannot be parsed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let lock_path = dir.join("store.lock");
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        if lock.try_lock_exclusive().is_err() {
            return Err(EventStoreError::Locked {
                path: dir.to_path_buf(),
            });
        }

        let events_path = dir.join("events.jsonl");
        let events = if events_path.exists() {
            let content = std::fs::read_to_string(&events_path)?;
            content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<std::result::Result<Vec<Event>, _>>()?
        } else {
            Vec::new()
        };

        let snapshots_path = dir.join("snapshots.json");
        let snapshots: SnapshotFile = if snapshots_path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&snapshots_path)?)?
        } else {
            SnapshotFile::default()
        };

        Ok(Self {
            events_path,
            snapshots_path,
            _lock: lock,
            events: RwLock::new(events),
            files: RwLock::new(snapshots.files.into_iter().map(|f| (f.id, f)).collect()),
            directories: RwLock::new(
                snapshots
                    .directories
                    .into_iter()
                    .map(|d| (d.id, d))
                    .collect(),
            ),
        })
    }

    /// Returns the path to the event file.
    #[must_use]
    pub const fn events_path(&self) -> &PathBuf {
        &self.events_path
    }

    fn write_snapshots(
        &self,
        files: &HashMap<Uuid, TrackedFile>,
        directories: &HashMap<Uuid, TrackedDirectory>,
    ) -> Result<()> {
        let mut snapshot = SnapshotFile {
            files: files.values().cloned().collect(),
            directories: directories.values().cloned().collect(),
        };
        snapshot.files.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.directories.sort_by(|a, b| a.id.cmp(&b.id));

        let json = serde_json::to_string_pretty(&snapshot)?;
        write_atomically(&self.snapshots_path, json.as_bytes())
    }
}

/// Writes a file via a temp sibling and rename, so readers never observe a
/// half-written document.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[allow(clippy::significant_drop_tightening)]
impl EventStore for FileEventStore {
    fn append(&self, mut event: Event) -> Result<Event> {
        let mut events = self.events.write().expect("lock poisoned");
        event.metadata.sequence = Some(events.len() as u64);

        let json = serde_json::to_string(&event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)?;
        writeln!(file, "{json}")?;

        events.push(event.clone());
        Ok(event)
    }

    fn read_all(&self) -> Result<Vec<Event>> {
        let events = self.events.read().expect("lock poisoned");
        Ok(events.clone())
    }

    fn replace_all(&self, mut events: Vec<Event>) -> Result<Vec<Event>> {
        for (index, event) in events.iter_mut().enumerate() {
            event.metadata.sequence = Some(index as u64);
        }

        let mut lines = String::new();
        for event in &events {
            lines.push_str(&serde_json::to_string(event)?);
            lines.push('\n');
        }

        let mut current = self.events.write().expect("lock poisoned");
        write_atomically(&self.events_path, lines.as_bytes())?;
        *current = events.clone();
        Ok(events)
    }

    // Both snapshot writers take the files lock before the directories
    // lock.
    fn save_file_snapshot(&self, file: TrackedFile) -> Result<()> {
        let mut files = self.files.write().expect("lock poisoned");
        files.insert(file.id, file);
        let directories = self.directories.read().expect("lock poisoned");
        self.write_snapshots(&files, &directories)
    }

    fn save_directory_snapshot(&self, directory: TrackedDirectory) -> Result<()> {
        let files = self.files.read().expect("lock poisoned");
        let mut directories = self.directories.write().expect("lock poisoned");
        directories.insert(directory.id, directory);
        self.write_snapshots(&files, &directories)
    }

    fn file_snapshot(&self, id: Uuid) -> Result<Option<TrackedFile>> {
        Ok(self.files.read().expect("lock poisoned").get(&id).cloned())
    }

    fn directory_snapshot(&self, id: Uuid) -> Result<Option<TrackedDirectory>> {
        Ok(self
            .directories
            .read()
            .expect("lock poisoned")
            .get(&id)
            .cloned())
    }

    fn all_files(&self) -> Result<Vec<TrackedFile>> {
        Ok(self
            .files
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect())
    }

    fn all_directories(&self) -> Result<Vec<TrackedDirectory>> {
        Ok(self
            .directories
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect())
    }
}
