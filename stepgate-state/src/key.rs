//! Composite checkpoint keys.
//!
//! Keys are a `(scope, entity, field)` tuple. Entity names are host names and
//! step names supplied by operators, so they may contain `:` or `/`; keeping
//! the parts separate means `("a:b", "c")` and `("a", "b:c")` never collide.
//!
//! ```
//! use stepgate_state::CheckpointKey;
//!
//! let key = CheckpointKey::new("replica_upgrade", "db-replica-1", "stopped");
//! assert_eq!(key.to_string(), "replica_upgrade:db-replica-1:stopped");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one checkpointed value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckpointKey {
    /// Component that owns the value (e.g. `replica_upgrade`)
    pub scope: String,
    /// Entity the value describes (e.g. a replica host)
    pub entity: String,
    /// Attribute of the entity (e.g. `stopped`)
    pub field: String,
}

impl CheckpointKey {
    /// Create a new key.
    pub fn new(
        scope: impl Into<String>,
        entity: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            entity: entity.into(),
            field: field.into(),
        }
    }
}

/// Rendering for logs and `state show` output only; never parsed back.
impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scope, self.entity, self.field)
    }
}
