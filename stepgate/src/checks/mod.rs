//! Read-only checks and the runner that executes them.
//!
//! The [`CheckRunner`] refuses any check that does not report itself as
//! read-only, converts check errors into `Block` findings tagged with the
//! check name, and always runs the full list.

mod mysql_compat;
mod schema_parity;

pub use mysql_compat::{MySqlCompatCheck, MySqlInspector, CHECK_MYSQL_COMPAT};
pub use schema_parity::{compare_schemas, SchemaParityCheck, CHECK_SCHEMA_PARITY};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::finding::{Finding, Summary};
use crate::plan::MigrationPlan;

/// Plan-derived parameters shared by every check in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckInput {
    pub source_version: String,
    pub target_version: String,
    pub primary_host: String,
    pub replica_host: String,
    pub connector: String,
}

impl CheckInput {
    pub fn from_plan(plan: &MigrationPlan, replica: impl Into<String>) -> Self {
        Self {
            source_version: plan.source_version.clone(),
            target_version: plan.target_version.clone(),
            primary_host: plan.topology.primary.clone(),
            replica_host: replica.into(),
            connector: plan.cdc.connector.clone(),
        }
    }

    /// Same input aimed at another replica.
    pub fn for_replica(&self, replica: impl Into<String>) -> Self {
        Self {
            replica_host: replica.into(),
            ..self.clone()
        }
    }
}

/// A read-only validation.
#[async_trait]
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    /// Must be `true` for the check to be accepted by [`CheckRunner`].
    fn read_only(&self) -> bool {
        true
    }

    async fn run(&self, input: &CheckInput, cancel: &CancellationToken) -> anyhow::Result<Vec<Finding>>;
}

/// Findings produced by one check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub check: String,
    pub findings: Vec<Finding>,
}

/// Flatten per-check results, tagging each finding with its check name.
pub fn flatten_results(results: &[CheckResult]) -> Vec<Finding> {
    results
        .iter()
        .flat_map(|r| {
            r.findings.iter().cloned().map(move |mut f| {
                f.tag("check", &r.check);
                f
            })
        })
        .collect()
}

/// Replace findings that have no message with a `Block` naming the check.
pub(crate) fn enforce_messages(check: &str, findings: Vec<Finding>) -> Vec<Finding> {
    findings
        .into_iter()
        .map(|f| {
            if f.has_message() {
                f
            } else {
                Finding::block(format!("check {check:?} emitted a finding without a message"))
                    .with_meta("check", check)
            }
        })
        .collect()
}

/// Runs checks sequentially against one [`CheckInput`].
pub struct CheckRunner {
    checks: Vec<Arc<dyn Check>>,
}

impl CheckRunner {
    pub fn new(checks: Vec<Arc<dyn Check>>) -> Self {
        Self { checks }
    }

    /// Run every check. Only a non-read-only check is an error; everything
    /// else is reported in the returned results.
    pub async fn run(
        &self,
        input: &CheckInput,
        cancel: &CancellationToken,
    ) -> Result<(Summary, Vec<CheckResult>)> {
        if let Some(check) = self.checks.iter().find(|c| !c.read_only()) {
            return Err(Error::NotReadOnly(check.name().to_string()));
        }

        let mut summary = Summary::default();
        let mut results = Vec::with_capacity(self.checks.len());

        for check in &self.checks {
            let name = check.name();
            info!(check = name, "Running check");

            let mut findings = match check.run(input, cancel).await {
                Ok(findings) => findings,
                Err(e) => {
                    warn!(check = name, error = %e, "Check failed");
                    vec![Finding::block(format!("check error: {e:#}")).with_meta("check", name)]
                }
            };
            findings = enforce_messages(name, findings);

            let batch = Summary::from_findings(&findings);
            debug!(check = name, info = batch.info, warn = batch.warn, block = batch.block, "Check finished");
            summary += batch;

            results.push(CheckResult {
                check: name.to_string(),
                findings,
            });
        }

        Ok((summary, results))
    }
}

type CheckFn =
    dyn Fn(CheckInput, CancellationToken) -> BoxFuture<'static, anyhow::Result<Vec<Finding>>> + Send + Sync;

/// A read-only check built from a closure.
pub struct FnCheck {
    name: String,
    run: Box<CheckFn>,
}

impl FnCheck {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(CheckInput, CancellationToken) -> BoxFuture<'static, anyhow::Result<Vec<Finding>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }
}

#[async_trait]
impl Check for FnCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: &CheckInput, cancel: &CancellationToken) -> anyhow::Result<Vec<Finding>> {
        (self.run)(input.clone(), cancel.clone()).await
    }
}
