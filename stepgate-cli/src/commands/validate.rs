use anyhow::Result;
use std::process::ExitCode;
use stepgate::checks::{CheckInput, CheckRunner};
use stepgate::Report;

use super::{ReplicaArgs, Session, SourceArgs};

/// Schema parity between the primary and `replica`.
pub async fn run_validate_replica(session: &Session, replica: &str, sources: &SourceArgs) -> Result<ExitCode> {
    let plan = session.load_plan()?;
    let pipeline = session.pipeline(plan, sources, &ReplicaArgs::default(), None);
    let input = pipeline.input()?.for_replica(replica);
    parity(session, "validate replica", &pipeline, &input).await
}

/// Schema parity between the primary and the plan's first replica.
pub async fn run_validate_primary(session: &Session, sources: &SourceArgs) -> Result<ExitCode> {
    let plan = session.load_plan()?;
    let pipeline = session.pipeline(plan, sources, &ReplicaArgs::default(), None);
    let input = pipeline.input()?;
    parity(session, "validate primary", &pipeline, &input).await
}

async fn parity(
    session: &Session,
    command: &str,
    pipeline: &stepgate::Pipeline,
    input: &CheckInput,
) -> Result<ExitCode> {
    let (summary, results) = CheckRunner::new(vec![pipeline.schema_parity_check()])
        .run(input, &session.cancel)
        .await?;
    session.emit(&Report::from_check_results(session.run_id, command, summary, &results))
}
