use anyhow::Result;
use std::process::ExitCode;
use stepgate::Report;
use tracing::info;

use super::{ReplicaArgs, Session, SourceArgs};

/// Confirm, then revalidate strictly before promotion.
pub async fn run_promote(
    session: &mut Session,
    confirm: &str,
    phrase: Option<String>,
    sources: &SourceArgs,
) -> Result<ExitCode> {
    if let Some(phrase) = phrase {
        session.config.promotion.confirmation_phrase = phrase;
    }
    let plan = session.load_plan()?;
    let pipeline = session.pipeline(plan, sources, &ReplicaArgs::default(), None);
    let input = pipeline.input()?;

    let report = pipeline.promotion_gate().run(&input, confirm, &session.cancel).await?;
    info!(approved = report.approved(), "Promotion gate evaluated");
    session.emit(&Report::new(session.run_id, "promote", report.summary, report.findings))
}
