//! File-backed checkpoint store.
//!
//! The whole document lives in one JSON file. Every mutation rewrites the file
//! through a temporary sibling that is fsynced and renamed into place, so a
//! crash leaves either the old or the new document, never a torn one.

use parking_lot::RwLock;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::document::{StateDocument, StateSnapshot};
use crate::error::{Result, StateError};
use crate::key::CheckpointKey;
use crate::traits::CheckpointStore;

/// Checkpoint store persisted to a JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    doc: RwLock<StateDocument>,
}

impl FileStore {
    /// Open the store at `path`, creating the file and its parent
    /// directories when missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(StateError::Config("state path is required".to_string()));
        }

        let doc = match std::fs::read(&path) {
            Ok(bytes) => StateDocument::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let doc = StateDocument::new();
                write_atomic(&path, &doc)?;
                debug!("Created state file {:?}", path);
                doc
            }
            Err(e) => return Err(e.into()),
        };

        debug!(
            "Opened state file {:?} ({} completed, {} values)",
            path,
            doc.completed.len(),
            doc.values.len()
        );

        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` and persist; the in-memory document is restored if
    /// persisting fails.
    fn mutate(&self, change: impl FnOnce(&mut StateDocument)) -> Result<()> {
        let mut doc = self.doc.write();
        let previous = doc.clone();
        change(&mut doc);
        doc.touch();

        if let Err(e) = write_atomic(&self.path, &doc) {
            warn!("Failed to persist state to {:?}: {}", self.path, e);
            *doc = previous;
            return Err(e);
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, doc: &StateDocument) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let bytes = doc.to_vec()?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl CheckpointStore for FileStore {
    fn get(&self, key: &CheckpointKey) -> Option<Value> {
        self.doc.read().values.get(key).cloned()
    }

    fn set(&self, key: CheckpointKey, value: Value) -> Result<()> {
        debug!("Checkpoint {} = {}", key, value);
        self.mutate(|doc| {
            doc.values.insert(key, value);
        })
    }

    fn mark_completed(&self, step: &str) -> Result<()> {
        debug!("Step {} completed", step);
        self.mutate(|doc| {
            doc.completed.insert(step.to_string());
        })
    }

    fn is_completed(&self, step: &str) -> bool {
        self.doc.read().completed.contains(step)
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::from_document(self.backend_name(), &self.doc.read())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
