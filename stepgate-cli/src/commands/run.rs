use anyhow::Result;
use std::process::ExitCode;
use stepgate::workflow::WorkflowRunner;
use stepgate::Report;
use tracing::info;

use super::{ReplicaArgs, Session, SourceArgs};

/// Execute every plan step through the workflow runner.
pub async fn run_workflow(
    session: &Session,
    allow_mutations: bool,
    confirm: Option<&str>,
    sources: &SourceArgs,
    replica: &ReplicaArgs,
) -> Result<ExitCode> {
    let plan = session.load_plan()?;
    let state = session.open_state(replica.state.as_deref())?;
    info!(
        migration = %plan.migration,
        steps = plan.steps.len(),
        allow_mutations,
        backend = state.backend_name(),
        "Running migration plan"
    );

    let pipeline = session.pipeline(plan, sources, replica, confirm);
    let report = WorkflowRunner::new(pipeline.steps(), state)
        .allow_mutations(allow_mutations)
        .run(&session.cancel)
        .await?;
    session.emit(&Report::from_workflow(session.run_id, "run", &report))
}
