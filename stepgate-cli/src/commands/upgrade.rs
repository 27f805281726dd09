use anyhow::Result;
use std::process::ExitCode;
use stepgate::Report;
use tracing::info;

use super::{ReplicaArgs, Session, SourceArgs};

/// Stop, upgrade and restart one replica, resuming from checkpoints.
pub async fn run_upgrade_replica(session: &Session, replica: &str, args: &ReplicaArgs) -> Result<ExitCode> {
    let plan = session.load_plan()?;
    let state = session.open_state(args.state.as_deref())?;
    info!(replica, backend = state.backend_name(), simulate = args.simulate, "Starting replica upgrade");

    let pipeline = session.pipeline(plan, &SourceArgs::default(), args, None);
    let report = pipeline.upgrade_orchestrator(state).run(replica, &session.cancel).await;
    session.emit(&Report::new(session.run_id, "upgrade replica", report.summary, report.findings))
}
