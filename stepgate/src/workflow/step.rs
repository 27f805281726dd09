use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use stepgate_state::CheckpointStore;
use tokio_util::sync::CancellationToken;

use crate::finding::Finding;

/// Everything a step sees while running.
pub struct StepContext<'a> {
    pub state: &'a Arc<dyn CheckpointStore>,
    pub cancel: &'a CancellationToken,
    findings: Vec<Finding>,
}

impl<'a> StepContext<'a> {
    pub fn new(state: &'a Arc<dyn CheckpointStore>, cancel: &'a CancellationToken) -> Self {
        Self {
            state,
            cancel,
            findings: Vec::new(),
        }
    }

    /// Record a finding.
    pub fn report(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        self.findings.extend(findings);
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub(crate) fn into_findings(self) -> Vec<Finding> {
        self.findings
    }
}

/// A single unit of work in a migration workflow.
///
/// Findings are reported through the [`StepContext`]. A returned error does
/// not discard them; the runner appends a `Block` describing the error.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    /// Steps must be safe to run more than once.
    fn idempotent(&self) -> bool {
        true
    }

    /// Whether the step changes target systems.
    fn mutates(&self) -> bool;

    async fn run(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()>;
}

type StepFn = dyn Fn(Arc<dyn CheckpointStore>, CancellationToken) -> BoxFuture<'static, anyhow::Result<Vec<Finding>>>
    + Send
    + Sync;

/// A step built from a closure.
pub struct FnStep {
    name: String,
    mutates: bool,
    run: Box<StepFn>,
}

impl FnStep {
    fn new<F>(name: impl Into<String>, mutates: bool, run: F) -> Self
    where
        F: Fn(Arc<dyn CheckpointStore>, CancellationToken) -> BoxFuture<'static, anyhow::Result<Vec<Finding>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            mutates,
            run: Box::new(run),
        }
    }

    /// A step that does not touch target systems.
    pub fn read_only<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(Arc<dyn CheckpointStore>, CancellationToken) -> BoxFuture<'static, anyhow::Result<Vec<Finding>>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, false, run)
    }

    /// A step that changes target systems; blocked unless mutations are allowed.
    pub fn mutating<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(Arc<dyn CheckpointStore>, CancellationToken) -> BoxFuture<'static, anyhow::Result<Vec<Finding>>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, true, run)
    }
}

#[async_trait]
impl Step for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn mutates(&self) -> bool {
        self.mutates
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
        let findings = (self.run)(ctx.state.clone(), ctx.cancel.clone()).await?;
        ctx.extend(findings);
        Ok(())
    }
}
