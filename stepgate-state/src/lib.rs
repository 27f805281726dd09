//! Checkpoint state for stepgate workflows.
//!
//! Workflows record which steps finished and which side effects already
//! happened, so a re-run after a crash or a block resumes instead of
//! repeating work. All orchestration code talks to a [`CheckpointStore`];
//! two backends are provided:
//!
//! - [`MemoryStore`] keeps state for the lifetime of the process
//! - [`FileStore`] persists a JSON document with atomic replace
//!
//! # State Document
//!
//! ```text
//! {
//!   "version": 1,
//!   "updated_at": "2026-10-19T08:00:00Z",
//!   "completed": ["preflight", "upgrade_replica"],
//!   "values": [
//!     {"scope": "replica_upgrade", "entity": "db-replica-1", "field": "stopped", "value": true}
//!   ]
//! }
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use stepgate_state::{CheckpointKey, CheckpointStore, FileStore};
//!
//! # fn example() -> stepgate_state::Result<()> {
//! let store = FileStore::open("./.stepgate/state.json")?;
//!
//! let key = CheckpointKey::new("replica_upgrade", "db-replica-1", "stopped");
//! if !store.flag(&key) {
//!     // ... stop replication ...
//!     store.set_flag(key)?;
//! }
//!
//! store.mark_completed("upgrade_replica")?;
//! # Ok(())
//! # }
//! ```

mod document;
mod error;
mod file;
mod key;
mod memory;
mod traits;

pub use document::{CheckpointEntry, StateDocument, StateSnapshot, STATE_VERSION};
pub use error::{Result, StateError};
pub use file::FileStore;
pub use key::CheckpointKey;
pub use memory::MemoryStore;
pub use traits::CheckpointStore;
