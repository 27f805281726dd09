use serde::Serialize;
use std::sync::Arc;
use stepgate_state::CheckpointStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::step::{Step, StepContext};
use crate::error::{Error, Result};
use crate::finding::{Finding, ResultAggregator, Summary};

/// Findings recorded for one executed (or gated) step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub findings: Vec<Finding>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Every step ran or was already complete
    Completed,
    /// A `Block` halted the run at `step`
    Blocked { step: String },
    /// Cancellation was observed before `step` started
    Cancelled { step: String },
}

/// Result of a workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub summary: Summary,
    pub outcome: Outcome,
    pub results: Vec<StepRecord>,
}

impl WorkflowReport {
    /// Findings recorded for `step`, if it ran.
    pub fn findings_for(&self, step: &str) -> Option<&[Finding]> {
        self.results
            .iter()
            .find(|r| r.step == step)
            .map(|r| r.findings.as_slice())
    }

    /// All findings in execution order, tagged with their step.
    pub fn findings(&self) -> Vec<Finding> {
        self.results
            .iter()
            .flat_map(|r| {
                r.findings.iter().cloned().map(move |mut f| {
                    f.tag("step", &r.step);
                    f
                })
            })
            .collect()
    }
}

/// Executes an ordered list of steps against one checkpoint store.
pub struct WorkflowRunner {
    steps: Vec<Arc<dyn Step>>,
    state: Arc<dyn CheckpointStore>,
    allow_mutations: bool,
}

impl WorkflowRunner {
    pub fn new(steps: Vec<Arc<dyn Step>>, state: Arc<dyn CheckpointStore>) -> Self {
        Self {
            steps,
            state,
            allow_mutations: false,
        }
    }

    /// Allow steps that report `mutates() == true` to run.
    pub fn allow_mutations(mut self, allow: bool) -> Self {
        self.allow_mutations = allow;
        self
    }

    /// Run the workflow.
    ///
    /// Returns an error only for configuration problems (a non-idempotent
    /// step), in which case no step runs. Everything else, including step
    /// failures, is reported in the [`WorkflowReport`].
    pub async fn run(&self, cancel: &CancellationToken) -> Result<WorkflowReport> {
        if let Some(step) = self.steps.iter().find(|s| !s.idempotent()) {
            return Err(Error::NonIdempotentStep(step.name().to_string()));
        }

        let mut aggregator = ResultAggregator::new();
        let mut results = Vec::new();

        for step in &self.steps {
            let name = step.name();

            if cancel.is_cancelled() {
                warn!(step = name, "Cancelled before step");
                return Ok(report(&aggregator, Outcome::Cancelled { step: name.to_string() }, results));
            }

            if self.state.is_completed(name) {
                info!(step = name, "Skipping completed step");
                continue;
            }

            if step.mutates() && !self.allow_mutations {
                warn!(step = name, "Mutating step blocked because mutations are not allowed");
                let findings = vec![Finding::block("mutating step blocked by configuration").with_meta("step", name)];
                aggregator.add_findings(&findings);
                results.push(StepRecord { step: name.to_string(), findings });
                return Ok(report(&aggregator, Outcome::Blocked { step: name.to_string() }, results));
            }

            info!(step = name, "Running step");
            let mut ctx = StepContext::new(&self.state, cancel);
            let outcome = step.run(&mut ctx).await;
            let mut findings = ctx.into_findings();
            if let Err(e) = outcome {
                warn!(step = name, error = %e, "Step failed");
                findings.push(Finding::block(format!("step error: {e:#}")).with_meta("step", name));
            }

            let batch = Summary::from_findings(&findings);
            let proceed = aggregator.add_findings(&findings);
            if !proceed {
                warn!(step = name, "Block encountered, halting workflow");
                results.push(StepRecord { step: name.to_string(), findings });
                return Ok(report(&aggregator, Outcome::Blocked { step: name.to_string() }, results));
            }

            if let Err(e) = self.state.mark_completed(name) {
                let failure = Finding::block(format!("failed to record completion of step {name:?}: {e}"))
                    .with_meta("step", name);
                aggregator.add_findings(std::slice::from_ref(&failure));
                findings.push(failure);
                results.push(StepRecord { step: name.to_string(), findings });
                return Ok(report(&aggregator, Outcome::Blocked { step: name.to_string() }, results));
            }
            info!(
                step = name,
                info = batch.info,
                warn = batch.warn,
                block = batch.block,
                "Completed step"
            );
            results.push(StepRecord { step: name.to_string(), findings });
        }

        info!("{}", aggregator.summary_line());
        Ok(report(&aggregator, Outcome::Completed, results))
    }
}

fn report(aggregator: &ResultAggregator, outcome: Outcome, results: Vec<StepRecord>) -> WorkflowReport {
    WorkflowReport {
        summary: aggregator.summary(),
        outcome,
        results,
    }
}
