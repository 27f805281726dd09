//! Replica upgrade orchestration.

mod upgrade;

pub use upgrade::{
    ReplicaActions, ReplicaInspector, ReplicationStatus, UpgradeOrchestrator, UpgradeReport,
    CHECKPOINT_SCOPE,
};
