use anyhow::Result;
use std::process::ExitCode;
use stepgate::checks::CheckRunner;
use stepgate::Report;

use super::{ReplicaArgs, Session, SourceArgs};

/// Connector health, plus schema-history coverage when configured.
pub async fn run_cdc_check(session: &Session, sources: &SourceArgs) -> Result<ExitCode> {
    let plan = session.load_plan()?;
    let pipeline = session.pipeline(plan, sources, &ReplicaArgs::default(), None);
    let input = pipeline.input()?;

    let (summary, results) = CheckRunner::new(pipeline.cdc_checks())
        .run(&input, &session.cancel)
        .await?;
    session.emit(&Report::from_check_results(session.run_id, "cdc check", summary, &results))
}
