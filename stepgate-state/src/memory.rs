//! In-memory checkpoint store.
//!
//! Used by tests and by dry runs where progress must not outlive the process.

use parking_lot::RwLock;
use serde_json::Value;

use crate::document::{StateDocument, StateSnapshot};
use crate::error::Result;
use crate::key::CheckpointKey;
use crate::traits::CheckpointStore;

/// Checkpoint store that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: RwLock<StateDocument>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            doc: RwLock::new(StateDocument::new()),
        }
    }
}

impl CheckpointStore for MemoryStore {
    fn get(&self, key: &CheckpointKey) -> Option<Value> {
        self.doc.read().values.get(key).cloned()
    }

    fn set(&self, key: CheckpointKey, value: Value) -> Result<()> {
        let mut doc = self.doc.write();
        doc.values.insert(key, value);
        doc.touch();
        Ok(())
    }

    fn mark_completed(&self, step: &str) -> Result<()> {
        let mut doc = self.doc.write();
        doc.completed.insert(step.to_string());
        doc.touch();
        Ok(())
    }

    fn is_completed(&self, step: &str) -> bool {
        self.doc.read().completed.contains(step)
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::from_document(self.backend_name(), &self.doc.read())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
