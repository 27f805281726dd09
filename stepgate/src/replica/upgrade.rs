//! Idempotent three-phase replica upgrade.
//!
//! Phases run in order: stop replication, run the upgrade, start
//! replication. Each phase is checkpointed under
//! `(replica_upgrade, <replica>, stopped|upgraded|resumed)` once its action
//! succeeds, so a re-run resumes at the first unfinished phase. A failed
//! action ends the run with a `Block` and leaves its checkpoint unset.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stepgate_state::{CheckpointKey, CheckpointStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::finding::{Finding, Summary};

pub const CHECKPOINT_SCOPE: &str = "replica_upgrade";

/// Replication thread state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationStatus {
    pub io_thread_running: bool,
    pub sql_thread_running: bool,
}

impl ReplicationStatus {
    pub fn running(&self) -> bool {
        self.io_thread_running && self.sql_thread_running
    }

    pub fn stopped(&self) -> bool {
        !self.io_thread_running && !self.sql_thread_running
    }
}

/// Read-only inspection used for orchestration decisions.
#[async_trait]
pub trait ReplicaInspector: Send + Sync {
    async fn is_primary(&self, host: &str, cancel: &CancellationToken) -> anyhow::Result<bool>;
    async fn replication_status(
        &self,
        replica: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ReplicationStatus>;
}

/// Mutating upgrade actions.
#[async_trait]
pub trait ReplicaActions: Send + Sync {
    async fn stop_replication(&self, replica: &str, cancel: &CancellationToken) -> anyhow::Result<()>;
    async fn run_upgrade(&self, replica: &str, cancel: &CancellationToken) -> anyhow::Result<()>;
    async fn start_replication(&self, replica: &str, cancel: &CancellationToken) -> anyhow::Result<()>;
}

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpgradeReport {
    pub summary: Summary,
    pub findings: Vec<Finding>,
}

impl UpgradeReport {
    fn push(&mut self, finding: Finding) {
        self.summary.record(finding.severity);
        self.findings.push(finding);
    }

    fn blocked(message: impl Into<String>, replica: &str) -> Self {
        let mut report = Self::default();
        report.push(Finding::block(message).with_meta("replica", replica));
        report
    }

    pub fn is_blocked(&self) -> bool {
        self.summary.is_blocked()
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Stop,
    Upgrade,
    Start,
}

impl Phase {
    const ALL: [Phase; 3] = [Phase::Stop, Phase::Upgrade, Phase::Start];

    fn field(self) -> &'static str {
        match self {
            Phase::Stop => "stopped",
            Phase::Upgrade => "upgraded",
            Phase::Start => "resumed",
        }
    }

    fn done_message(self) -> &'static str {
        match self {
            Phase::Stop => "replication stopped",
            Phase::Upgrade => "upgrade completed",
            Phase::Start => "replication started",
        }
    }

    fn skipped_message(self) -> &'static str {
        match self {
            Phase::Stop => "replication already stopped",
            Phase::Upgrade => "upgrade already completed",
            Phase::Start => "replication already started",
        }
    }

    fn failure_prefix(self) -> &'static str {
        match self {
            Phase::Stop => "failed to stop replication",
            Phase::Upgrade => "upgrade failed",
            Phase::Start => "failed to start replication",
        }
    }
}

fn checkpoint(replica: &str, field: &str) -> CheckpointKey {
    CheckpointKey::new(CHECKPOINT_SCOPE, replica, field)
}

/// Coordinates a safe, resumable upgrade of one replica.
pub struct UpgradeOrchestrator {
    inspector: Arc<dyn ReplicaInspector>,
    actions: Arc<dyn ReplicaActions>,
    state: Arc<dyn CheckpointStore>,
    primary: String,
}

impl UpgradeOrchestrator {
    pub fn new(
        inspector: Arc<dyn ReplicaInspector>,
        actions: Arc<dyn ReplicaActions>,
        state: Arc<dyn CheckpointStore>,
        primary: impl Into<String>,
    ) -> Self {
        Self {
            inspector,
            actions,
            state,
            primary: primary.into(),
        }
    }

    /// Upgrade `replica`. Expected problems are reported as findings; this
    /// never fails.
    pub async fn run(&self, replica: &str, cancel: &CancellationToken) -> UpgradeReport {
        let replica = replica.trim();
        if replica.is_empty() {
            let mut report = UpgradeReport::default();
            report.push(Finding::block("replica is required"));
            return report;
        }

        if !self.primary.is_empty() && replica == self.primary {
            warn!(replica, "Refusing to upgrade configured primary");
            return UpgradeReport::blocked("refusing to upgrade primary", replica);
        }
        match self.inspector.is_primary(replica, cancel).await {
            Ok(true) => {
                warn!(replica, "Refusing to upgrade host reported as primary");
                return UpgradeReport::blocked("refusing to upgrade primary", replica);
            }
            Ok(false) => {}
            Err(e) => {
                return UpgradeReport::blocked(format!("failed to determine primary status: {e:#}"), replica);
            }
        }

        let mut report = UpgradeReport::default();
        match self.inspector.replication_status(replica, cancel).await {
            Ok(status) => {
                for finding in self.detect_partial_progress(replica, status) {
                    report.push(finding);
                }
            }
            Err(e) => {
                warn!(replica, error = %e, "Replication status unavailable, trusting checkpoints");
                report.push(
                    Finding::warn(format!("unable to read replication status: {e:#}"))
                        .with_meta("replica", replica),
                );
            }
        }

        for phase in Phase::ALL {
            let key = checkpoint(replica, phase.field());
            if self.state.flag(&key) {
                report.push(Finding::info(phase.skipped_message()).with_meta("replica", replica));
                continue;
            }

            info!(replica, phase = phase.field(), "Running upgrade phase");
            let result = match phase {
                Phase::Stop => self.actions.stop_replication(replica, cancel).await,
                Phase::Upgrade => self.actions.run_upgrade(replica, cancel).await,
                Phase::Start => self.actions.start_replication(replica, cancel).await,
            };
            if let Err(e) = result {
                warn!(replica, phase = phase.field(), error = %e, "Upgrade phase failed");
                report.push(
                    Finding::block(format!("{}: {e:#}", phase.failure_prefix()))
                        .with_meta("replica", replica),
                );
                return report;
            }

            if let Err(e) = self.state.set_flag(key) {
                report.push(
                    Finding::block(format!("failed to record checkpoint {:?}: {e}", phase.field()))
                        .with_meta("replica", replica),
                );
                return report;
            }
            report.push(Finding::info(phase.done_message()).with_meta("replica", replica));
        }

        report
    }

    /// Compare live thread state with recorded checkpoints.
    fn detect_partial_progress(&self, replica: &str, status: ReplicationStatus) -> Vec<Finding> {
        let stopped = self.state.flag(&checkpoint(replica, Phase::Stop.field()));
        let resumed = self.state.flag(&checkpoint(replica, Phase::Start.field()));
        let mut findings = Vec::new();

        if status.stopped() && !stopped {
            findings.push(
                Finding::warn("replication appears stopped but checkpoint is missing")
                    .with_meta("replica", replica),
            );
        }
        if status.running() && stopped && !resumed {
            findings.push(
                Finding::warn("checkpoint indicates replication stopped but status is running")
                    .with_meta("replica", replica),
            );
        }
        if status.stopped() && resumed {
            findings.push(
                Finding::warn("checkpoint indicates replication started but status is stopped")
                    .with_meta("replica", replica),
            );
        }
        findings
    }
}
