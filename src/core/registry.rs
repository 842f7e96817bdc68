//! Path/identity registry for files and directories.
//!
//! The registry maintains the canonical namespace of the tracked tree as
//! events are applied: a bidirectional mapping between hierarchical paths
//! and stable identities. Identities are never reused and never hard-deleted
//! (past states must stay reconstructable); deletion only flags the entry
//! and drops it from the live-path lookup.
//!
//! Paths are `/`-separated and relative; the project root is the empty
//! string.

use crate::core::error::{CodetraceError, Result};
use crate::core::events::{Event, EventPayload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

const ORIGIN: &str = "core:registry";

/// Identity and current location of a tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    /// Stable identity, never reused.
    pub id: Uuid,
    /// Current path (the last live path, for deleted entries).
    pub path: String,
    /// Identity of the containing directory.
    pub parent_id: Uuid,
    /// Soft-delete flag; deleted entries stay retrievable by id.
    pub is_deleted: bool,
}

/// Identity and current location of a tracked directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedDirectory {
    /// Stable identity, never reused.
    pub id: Uuid,
    /// Current path (empty for the project root).
    pub path: String,
    /// Identity of the containing directory; `None` only for the root.
    pub parent_id: Option<Uuid>,
    /// Soft-delete flag; deleted entries stay retrievable by id.
    pub is_deleted: bool,
}

/// One registry entry touched by a mutation, handed back so the caller can
/// persist each affected entity individually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathUpdate {
    File(TrackedFile),
    Directory(TrackedDirectory),
}

/// Returns the parent portion of a path (empty for top-level entries).
#[must_use]
pub fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// The canonical path-to-identity namespace.
///
/// The id-keyed stores keep every identity ever created; the path maps hold
/// only live entries, and no two live entities may share a path.
#[derive(Debug, Clone, Default)]
pub struct PathRegistry {
    files: HashMap<Uuid, TrackedFile>,
    directories: HashMap<Uuid, TrackedDirectory>,
    file_paths: HashMap<String, Uuid>,
    directory_paths: HashMap<String, Uuid>,
}

impl PathRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted snapshots.
    #[must_use]
    pub fn hydrate(files: Vec<TrackedFile>, directories: Vec<TrackedDirectory>) -> Self {
        let mut registry = Self::new();
        for file in files {
            if !file.is_deleted {
                registry.file_paths.insert(file.path.clone(), file.id);
            }
            registry.files.insert(file.id, file);
        }
        for directory in directories {
            if !directory.is_deleted {
                registry
                    .directory_paths
                    .insert(directory.path.clone(), directory.id);
            }
            registry.directories.insert(directory.id, directory);
        }
        registry
    }

    /// Resolves a live file path to its identity.
    #[must_use]
    pub fn file_id(&self, path: &str) -> Option<Uuid> {
        self.file_paths.get(path).copied()
    }

    /// Resolves a live directory path to its identity.
    #[must_use]
    pub fn directory_id(&self, path: &str) -> Option<Uuid> {
        self.directory_paths.get(path).copied()
    }

    /// Looks up a file by id, deleted entries included.
    #[must_use]
    pub fn file(&self, id: Uuid) -> Option<&TrackedFile> {
        self.files.get(&id)
    }

    /// Looks up a directory by id, deleted entries included.
    #[must_use]
    pub fn directory(&self, id: Uuid) -> Option<&TrackedDirectory> {
        self.directories.get(&id)
    }

    /// Iterates over every file identity ever tracked, deleted included.
    pub fn files(&self) -> impl Iterator<Item = &TrackedFile> {
        self.files.values()
    }

    /// Iterates over every directory identity ever tracked, deleted
    /// included.
    pub fn directories(&self) -> impl Iterator<Item = &TrackedDirectory> {
        self.directories.values()
    }

    /// Returns all live files.
    #[must_use]
    pub fn live_files(&self) -> Vec<&TrackedFile> {
        let mut files: Vec<&TrackedFile> =
            self.files.values().filter(|f| !f.is_deleted).collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Returns all live directories.
    #[must_use]
    pub fn live_directories(&self) -> Vec<&TrackedDirectory> {
        let mut directories: Vec<&TrackedDirectory> =
            self.directories.values().filter(|d| !d.is_deleted).collect();
        directories.sort_by(|a, b| a.path.cmp(&b.path));
        directories
    }

    /// Tracks a new file.
    ///
    /// # Errors
    /// Fails if the path already has a live entry or the parent directory
    /// path is not live.
    pub fn add_file(&mut self, id: Uuid, path: &str) -> Result<PathUpdate> {
        self.ensure_path_free(path)?;
        let parent_id = self.live_parent(path)?;
        let file = TrackedFile {
            id,
            path: path.to_string(),
            parent_id,
            is_deleted: false,
        };
        self.file_paths.insert(path.to_string(), id);
        self.files.insert(id, file.clone());
        Ok(PathUpdate::File(file))
    }

    /// Tracks a new directory. An empty path creates the project root.
    ///
    /// # Errors
    /// Fails if the path already has a live entry or (for non-root
    /// directories) the parent directory path is not live.
    pub fn add_directory(&mut self, id: Uuid, path: &str) -> Result<PathUpdate> {
        self.ensure_path_free(path)?;
        let parent_id = if path.is_empty() {
            None
        } else {
            Some(self.live_parent(path)?)
        };
        let directory = TrackedDirectory {
            id,
            path: path.to_string(),
            parent_id,
            is_deleted: false,
        };
        self.directory_paths.insert(path.to_string(), id);
        self.directories.insert(id, directory.clone());
        Ok(PathUpdate::Directory(directory))
    }

    /// Soft-deletes the file at a live path.
    ///
    /// # Errors
    /// Fails with a not-tracked error if the path has no live file.
    pub fn remove_file(&mut self, path: &str) -> Result<PathUpdate> {
        let id = self
            .file_id(path)
            .ok_or_else(|| Self::not_tracked("file", path))?;
        self.file_paths.remove(path);
        let file = self.files.get_mut(&id).expect("path map points at entry");
        file.is_deleted = true;
        Ok(PathUpdate::File(file.clone()))
    }

    /// Soft-deletes the directory at a live path.
    ///
    /// The registry does not cascade: event producers must have deleted
    /// every descendant first, one event at a time.
    ///
    /// # Errors
    /// Fails with a not-tracked error if the path has no live directory,
    /// and with a precondition error if live descendants remain.
    pub fn remove_directory(&mut self, path: &str) -> Result<PathUpdate> {
        let id = self
            .directory_id(path)
            .ok_or_else(|| Self::not_tracked("directory", path))?;
        if self.has_live_children(id) {
            return Err(CodetraceError::precondition(
                "directory_not_empty",
                format!("Directory {path:?} still has live descendants"),
                ORIGIN,
            ));
        }
        self.directory_paths.remove(path);
        let directory = self
            .directories
            .get_mut(&id)
            .expect("path map points at entry");
        directory.is_deleted = true;
        Ok(PathUpdate::Directory(directory.clone()))
    }

    /// Renames a file in place (same parent directory).
    ///
    /// # Errors
    /// Fails if the old path is not live, the new path is taken, or the new
    /// path leaves the parent directory.
    pub fn rename_file(&mut self, old_path: &str, new_path: &str) -> Result<PathUpdate> {
        if parent_path(old_path) != parent_path(new_path) {
            return Err(CodetraceError::user(
                "rename_changes_parent",
                format!("Rename from {old_path:?} to {new_path:?} changes the parent directory"),
                ORIGIN,
            ));
        }
        self.relocate_file(old_path, new_path)
    }

    /// Moves a file to a different parent directory.
    ///
    /// # Errors
    /// Fails if the old path is not live, the new path is taken, or the new
    /// parent directory is not live.
    pub fn move_file(&mut self, old_path: &str, new_path: &str) -> Result<PathUpdate> {
        self.relocate_file(old_path, new_path)
    }

    /// Renames a directory in place, cascading the path change to every
    /// live descendant.
    ///
    /// # Errors
    /// Fails if the old path is not live, the new path is taken, or the new
    /// path leaves the parent directory.
    pub fn rename_directory(&mut self, old_path: &str, new_path: &str) -> Result<Vec<PathUpdate>> {
        if parent_path(old_path) != parent_path(new_path) {
            return Err(CodetraceError::user(
                "rename_changes_parent",
                format!("Rename from {old_path:?} to {new_path:?} changes the parent directory"),
                ORIGIN,
            ));
        }
        self.relocate_directory(old_path, new_path)
    }

    /// Moves a directory to a different parent directory, cascading the
    /// path change to every live descendant.
    ///
    /// # Errors
    /// Fails if the old path is not live, the new path is taken, the new
    /// parent is not live, or the destination lies inside the moved
    /// directory.
    pub fn move_directory(&mut self, old_path: &str, new_path: &str) -> Result<Vec<PathUpdate>> {
        if new_path == old_path || new_path.starts_with(&format!("{old_path}/")) {
            return Err(CodetraceError::user(
                "move_into_self",
                format!("Cannot move {old_path:?} into itself"),
                ORIGIN,
            ));
        }
        self.relocate_directory(old_path, new_path)
    }

    /// Applies a file-system event, verifying that the identities recorded
    /// on the event match the registry's view.
    ///
    /// # Errors
    /// Surfaces the underlying operation error, or a precondition error if
    /// the event's identity disagrees with the registry.
    pub fn apply(&mut self, event: &Event) -> Result<Vec<PathUpdate>> {
        match &event.payload {
            EventPayload::FileCreated { file_id, path, .. } => {
                Ok(vec![self.add_file(*file_id, path)?])
            }
            EventPayload::FileDeleted { file_id, path, .. } => {
                self.check_identity(self.file_id(path), *file_id, path)?;
                Ok(vec![self.remove_file(path)?])
            }
            EventPayload::FileMoved {
                file_id,
                old_path,
                new_path,
                ..
            } => {
                self.check_identity(self.file_id(old_path), *file_id, old_path)?;
                Ok(vec![self.move_file(old_path, new_path)?])
            }
            EventPayload::FileRenamed {
                file_id,
                old_path,
                new_path,
                ..
            } => {
                self.check_identity(self.file_id(old_path), *file_id, old_path)?;
                Ok(vec![self.rename_file(old_path, new_path)?])
            }
            EventPayload::DirectoryCreated {
                directory_id, path, ..
            } => Ok(vec![self.add_directory(*directory_id, path)?]),
            EventPayload::DirectoryDeleted {
                directory_id, path, ..
            } => {
                self.check_identity(self.directory_id(path), *directory_id, path)?;
                Ok(vec![self.remove_directory(path)?])
            }
            EventPayload::DirectoryMoved {
                directory_id,
                old_path,
                new_path,
                ..
            } => {
                self.check_identity(self.directory_id(old_path), *directory_id, old_path)?;
                self.move_directory(old_path, new_path)
            }
            EventPayload::DirectoryRenamed {
                directory_id,
                old_path,
                new_path,
                ..
            } => {
                self.check_identity(self.directory_id(old_path), *directory_id, old_path)?;
                self.rename_directory(old_path, new_path)
            }
            other => Err(CodetraceError::precondition(
                "not_a_filesystem_event",
                format!("Registry cannot apply {other:?}"),
                ORIGIN,
            )),
        }
    }

    fn relocate_file(&mut self, old_path: &str, new_path: &str) -> Result<PathUpdate> {
        let id = self
            .file_id(old_path)
            .ok_or_else(|| Self::not_tracked("file", old_path))?;
        self.ensure_path_free(new_path)?;
        let parent_id = self.live_parent(new_path)?;

        self.file_paths.remove(old_path);
        self.file_paths.insert(new_path.to_string(), id);
        let file = self.files.get_mut(&id).expect("path map points at entry");
        file.path = new_path.to_string();
        file.parent_id = parent_id;
        Ok(PathUpdate::File(file.clone()))
    }

    /// Shared mechanics of directory rename and move. The cascade runs over
    /// an explicit worklist of directory ids rather than recursion, so deep
    /// trees cannot exhaust the call stack.
    fn relocate_directory(&mut self, old_path: &str, new_path: &str) -> Result<Vec<PathUpdate>> {
        let id = self
            .directory_id(old_path)
            .ok_or_else(|| Self::not_tracked("directory", old_path))?;
        self.ensure_path_free(new_path)?;
        let parent_id = self.live_parent(new_path)?;

        self.directory_paths.remove(old_path);
        self.directory_paths.insert(new_path.to_string(), id);
        let directory = self
            .directories
            .get_mut(&id)
            .expect("path map points at entry");
        directory.path = new_path.to_string();
        directory.parent_id = Some(parent_id);
        let mut updates = vec![PathUpdate::Directory(directory.clone())];

        let old_prefix = format!("{old_path}/");
        let new_prefix = format!("{new_path}/");
        let mut worklist = vec![id];
        while let Some(directory_id) = worklist.pop() {
            let child_files: Vec<Uuid> = self
                .files
                .values()
                .filter(|f| !f.is_deleted && f.parent_id == directory_id)
                .map(|f| f.id)
                .collect();
            for file_id in child_files {
                let file = self.files.get_mut(&file_id).expect("child listed");
                let rewritten = format!("{new_prefix}{}", &file.path[old_prefix.len()..]);
                self.file_paths.remove(&file.path);
                self.file_paths.insert(rewritten.clone(), file.id);
                file.path = rewritten;
                updates.push(PathUpdate::File(file.clone()));
            }

            let child_directories: Vec<Uuid> = self
                .directories
                .values()
                .filter(|d| !d.is_deleted && d.parent_id == Some(directory_id))
                .map(|d| d.id)
                .collect();
            for child_id in child_directories {
                let child = self.directories.get_mut(&child_id).expect("child listed");
                let rewritten = format!("{new_prefix}{}", &child.path[old_prefix.len()..]);
                self.directory_paths.remove(&child.path);
                self.directory_paths.insert(rewritten.clone(), child.id);
                child.path = rewritten;
                updates.push(PathUpdate::Directory(child.clone()));
                worklist.push(child_id);
            }
        }

        Ok(updates)
    }

    fn has_live_children(&self, directory_id: Uuid) -> bool {
        self.files
            .values()
            .any(|f| !f.is_deleted && f.parent_id == directory_id)
            || self
                .directories
                .values()
                .any(|d| !d.is_deleted && d.parent_id == Some(directory_id))
    }

    fn ensure_path_free(&self, path: &str) -> Result<()> {
        if self.file_paths.contains_key(path) || self.directory_paths.contains_key(path) {
            return Err(CodetraceError::user(
                "path_already_tracked",
                format!("A live entry already exists at {path:?}"),
                ORIGIN,
            )
            .with_context("path", path));
        }
        Ok(())
    }

    fn live_parent(&self, path: &str) -> Result<Uuid> {
        let parent = parent_path(path);
        self.directory_id(parent)
            .ok_or_else(|| Self::not_tracked("directory", parent))
    }

    fn not_tracked(kind: &str, path: &str) -> CodetraceError {
        CodetraceError::not_tracked(
            "unknown_path",
            format!("No live {kind} at {path:?}"),
            ORIGIN,
        )
        .with_context("path", path)
        .with_hint("The tree has diverged from the tracked history; reconcile before retrying")
    }

    fn check_identity(&self, found: Option<Uuid>, expected: Uuid, path: &str) -> Result<()> {
        match found {
            Some(id) if id == expected => Ok(()),
            _ => Err(CodetraceError::precondition(
                "identity_mismatch",
                format!("Event addresses {expected} at {path:?}, registry holds {found:?}"),
                ORIGIN,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Registry with root, `src/`, `src/lib.rs`, `src/util/`,
    /// `src/util/io.rs`.
    fn populated() -> (PathRegistry, Uuid, Uuid) {
        let mut registry = PathRegistry::new();
        registry.add_directory(Uuid::new_v4(), "").unwrap();
        let src = Uuid::new_v4();
        registry.add_directory(src, "src").unwrap();
        let lib = Uuid::new_v4();
        registry.add_file(lib, "src/lib.rs").unwrap();
        registry.add_directory(Uuid::new_v4(), "src/util").unwrap();
        registry.add_file(Uuid::new_v4(), "src/util/io.rs").unwrap();
        (registry, src, lib)
    }

    #[test]
    fn add_and_lookup() {
        let (registry, src, lib) = populated();
        assert_eq!(registry.directory_id("src"), Some(src));
        assert_eq!(registry.file_id("src/lib.rs"), Some(lib));
        assert_eq!(registry.file_id("src/nope.rs"), None);
        assert_eq!(registry.file(lib).unwrap().parent_id, src);
    }

    #[test]
    fn add_requires_live_parent() {
        let mut registry = PathRegistry::new();
        registry.add_directory(Uuid::new_v4(), "").unwrap();
        let err = registry.add_file(Uuid::new_v4(), "missing/file.rs").unwrap_err();
        assert!(err.recoverable);
    }

    #[test]
    fn duplicate_path_rejected() {
        let (mut registry, ..) = populated();
        assert!(registry.add_file(Uuid::new_v4(), "src/lib.rs").is_err());
        assert!(registry.add_directory(Uuid::new_v4(), "src").is_err());
        // A file may not shadow a directory path either.
        assert!(registry.add_file(Uuid::new_v4(), "src/util").is_err());
    }

    #[test]
    fn remove_is_soft() {
        let (mut registry, _, lib) = populated();
        registry.remove_file("src/lib.rs").unwrap();

        assert_eq!(registry.file_id("src/lib.rs"), None);
        let entry = registry.file(lib).unwrap();
        assert!(entry.is_deleted);
        assert_eq!(entry.path, "src/lib.rs");

        // Removing again is a not-tracked error.
        let err = registry.remove_file("src/lib.rs").unwrap_err();
        assert!(err.recoverable);
    }

    #[test]
    fn remove_directory_requires_empty() {
        let (mut registry, ..) = populated();
        assert!(registry.remove_directory("src").is_err());

        registry.remove_file("src/util/io.rs").unwrap();
        registry.remove_directory("src/util").unwrap();
        registry.remove_file("src/lib.rs").unwrap();
        registry.remove_directory("src").unwrap();
        assert_eq!(registry.directory_id("src"), None);
    }

    #[test]
    fn rename_directory_cascades() {
        let (mut registry, src, lib) = populated();
        let updates = registry.rename_directory("src", "lib").unwrap();

        // Renamed directory plus three descendants.
        assert_eq!(updates.len(), 4);
        assert_eq!(registry.directory_id("src"), None);
        assert_eq!(registry.directory_id("lib"), Some(src));
        assert_eq!(registry.file_id("lib/lib.rs"), Some(lib));
        assert!(registry.directory_id("lib/util").is_some());
        assert!(registry.file_id("lib/util/io.rs").is_some());
        assert_eq!(registry.file_id("src/lib.rs"), None);
        assert_eq!(registry.file(lib).unwrap().path, "lib/lib.rs");
    }

    #[test]
    fn move_directory_cascades_and_reparents() {
        let (mut registry, ..) = populated();
        registry.add_directory(Uuid::new_v4(), "vendor").unwrap();

        let util = registry.directory_id("src/util").unwrap();
        registry.move_directory("src/util", "vendor/util").unwrap();

        assert_eq!(registry.directory_id("vendor/util"), Some(util));
        assert!(registry.file_id("vendor/util/io.rs").is_some());
        assert_eq!(registry.file_id("src/util/io.rs"), None);
        let root_relative = registry.directory(util).unwrap();
        assert_eq!(
            root_relative.parent_id,
            registry.directory_id("vendor").map(Some).unwrap()
        );
    }

    #[test]
    fn move_into_self_rejected() {
        let (mut registry, ..) = populated();
        assert!(registry.move_directory("src", "src/util/src").is_err());
        assert!(registry.move_directory("src", "src").is_err());
    }

    #[test]
    fn rename_must_stay_in_parent() {
        let (mut registry, ..) = populated();
        assert!(registry.rename_file("src/lib.rs", "lib.rs").is_err());
        assert!(registry
            .rename_file("src/lib.rs", "src/main.rs")
            .is_ok());
    }

    #[test]
    fn deleted_directory_paths_do_not_block_new_entries() {
        let (mut registry, ..) = populated();
        registry.remove_file("src/util/io.rs").unwrap();
        registry.remove_directory("src/util").unwrap();

        // The path is free again for a brand-new identity.
        let fresh = Uuid::new_v4();
        registry.add_directory(fresh, "src/util").unwrap();
        assert_eq!(registry.directory_id("src/util"), Some(fresh));
    }

    #[test]
    fn hydrate_restores_live_lookups_only() {
        let (mut registry, _, lib) = populated();
        registry.remove_file("src/lib.rs").unwrap();

        let files: Vec<TrackedFile> = registry.files.values().cloned().collect();
        let directories: Vec<TrackedDirectory> =
            registry.directories.values().cloned().collect();
        let restored = PathRegistry::hydrate(files, directories);

        assert_eq!(restored.file_id("src/lib.rs"), None);
        assert!(restored.file(lib).unwrap().is_deleted);
        assert!(restored.file_id("src/util/io.rs").is_some());
    }
}
