use anyhow::Result;
use std::path::Path;
use std::process::ExitCode;

use super::Session;

/// Print the checkpoint store contents as JSON.
pub fn run_state_show(session: &Session, path: Option<&Path>) -> Result<ExitCode> {
    let state = session.open_state(path)?;
    println!("{}", serde_json::to_string_pretty(&state.snapshot())?);
    Ok(ExitCode::SUCCESS)
}
