//! Core checkpoint store trait.
//!
//! The `CheckpointStore` trait is the only way orchestration components read
//! or record progress. Backends decide where the data lives; the contract is
//! the same for all of them.

use serde_json::Value;

use crate::document::StateSnapshot;
use crate::error::Result;
use crate::key::CheckpointKey;

/// Checkpoint state shared by one workflow invocation.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` and guard their contents with an
/// internal lock, so one instance can be shared by several components of a
/// single run. Separate processes pointed at the same backing store are not
/// coordinated: the last writer wins.
///
/// # Durability
///
/// Durable backends persist synchronously inside `set` and `mark_completed`;
/// once either returns `Ok`, a crash cannot lose the checkpoint.
pub trait CheckpointStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &CheckpointKey) -> Option<Value>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: CheckpointKey, value: Value) -> Result<()>;

    /// Mark a workflow step as completed.
    fn mark_completed(&self, step: &str) -> Result<()>;

    /// Whether a workflow step has been marked completed.
    fn is_completed(&self, step: &str) -> bool;

    /// Copy of the current contents.
    fn snapshot(&self) -> StateSnapshot;

    /// Get a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Read a boolean value; non-boolean values read as absent.
    fn get_bool(&self, key: &CheckpointKey) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// Whether a boolean flag is set to `true`.
    fn flag(&self, key: &CheckpointKey) -> bool {
        self.get_bool(key).unwrap_or(false)
    }

    /// Set a boolean flag to `true`.
    fn set_flag(&self, key: CheckpointKey) -> Result<()> {
        self.set(key, Value::Bool(true))
    }
}
