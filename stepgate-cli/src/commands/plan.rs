use anyhow::Result;
use std::process::ExitCode;
use stepgate::{Finding, Report};
use tracing::info;

use super::Session;

/// Validate the plan. An invalid plan is reported as a BLOCK, not an error.
pub fn run_plan(session: &Session) -> Result<ExitCode> {
    let finding = match stepgate::load_plan(&session.plan_path) {
        Ok(plan) => {
            info!(migration = %plan.migration, steps = plan.steps.len(), "Plan is valid");
            Finding::info(format!("plan {:?} is valid", plan.migration)).with_meta("steps", &plan.steps)
        }
        Err(e) => Finding::block(e.to_string()).with_meta("plan", session.plan_path.display().to_string()),
    };
    session.emit(&Report::from_findings(session.run_id, "plan", vec![finding]))
}
