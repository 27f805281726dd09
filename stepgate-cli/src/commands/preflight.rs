use anyhow::Result;
use std::process::ExitCode;
use stepgate::checks::CheckRunner;
use stepgate::Report;

use super::{ReplicaArgs, Session, SourceArgs};

/// Run every read-only check against the plan's first replica.
pub async fn run_preflight(session: &Session, sources: &SourceArgs) -> Result<ExitCode> {
    let plan = session.load_plan()?;
    let pipeline = session.pipeline(plan, sources, &ReplicaArgs::default(), None);
    let input = pipeline.input()?;

    let (summary, results) = CheckRunner::new(pipeline.preflight_checks())
        .run(&input, &session.cancel)
        .await?;
    session.emit(&Report::from_check_results(session.run_id, "preflight", summary, &results))
}
