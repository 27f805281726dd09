//! Promotion gate: explicit confirmation plus a strictly clean revalidation.
//!
//! Earlier steps tolerate `Warn`; promotion does not. Any `Warn` or `Block`
//! from the revalidation adds a synthetic `Block`.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checks::{flatten_results, Check, CheckInput, CheckRunner};
use crate::config::{default_required_checks, PromotionConfig};
use crate::error::{Error, Result};
use crate::finding::{Finding, Summary};

/// Result of one gate evaluation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromotionReport {
    pub summary: Summary,
    pub findings: Vec<Finding>,
}

impl PromotionReport {
    fn single(finding: Finding) -> Self {
        Self {
            summary: Summary::from_findings(std::slice::from_ref(&finding)),
            findings: vec![finding],
        }
    }

    /// Whether promotion may proceed.
    pub fn approved(&self) -> bool {
        !self.summary.is_blocked()
    }
}

pub struct PromotionGate {
    checks: Vec<Arc<dyn Check>>,
    required_checks: Vec<String>,
    confirmation_phrase: String,
}

impl PromotionGate {
    pub fn new(checks: Vec<Arc<dyn Check>>, config: &PromotionConfig) -> Self {
        let required_checks = if config.required_checks.is_empty() {
            default_required_checks()
        } else {
            config.required_checks.clone()
        };
        Self {
            checks,
            required_checks,
            confirmation_phrase: config.confirmation_phrase.clone(),
        }
    }

    /// Required check names absent from the supplied checks.
    pub fn missing_checks(&self) -> Vec<String> {
        let present: HashSet<&str> = self.checks.iter().map(|c| c.name()).collect();
        self.required_checks
            .iter()
            .filter(|name| !present.contains(name.as_str()))
            .cloned()
            .collect()
    }

    pub async fn run(
        &self,
        input: &CheckInput,
        confirmation: &str,
        cancel: &CancellationToken,
    ) -> Result<PromotionReport> {
        if self.confirmation_phrase.trim().is_empty() {
            return Err(Error::Config("confirmation phrase is required".to_string()));
        }

        if confirmation != self.confirmation_phrase {
            warn!("Promotion attempted without matching confirmation");
            return Ok(PromotionReport::single(
                Finding::block("promotion requires explicit confirmation")
                    .with_meta("required", &self.confirmation_phrase),
            ));
        }

        let missing = self.missing_checks();
        if !missing.is_empty() {
            warn!(missing = ?missing, "Promotion missing required checks");
            return Ok(PromotionReport::single(
                Finding::block(format!("promotion requires checks: {}", missing.join(", ")))
                    .with_meta("missing", &missing),
            ));
        }

        info!(checks = self.checks.len(), "Revalidating before promotion");
        let runner = CheckRunner::new(self.checks.clone());
        let (mut summary, results) = runner.run(input, cancel).await?;
        let mut findings = flatten_results(&results);

        if !summary.is_clean() {
            findings.push(
                Finding::block(format!(
                    "promotion blocked due to WARN/BLOCK findings (WARN={}, BLOCK={})",
                    summary.warn, summary.block
                ))
                .with_meta("warn", summary.warn)
                .with_meta("block", summary.block),
            );
            summary.block += 1;
        }

        Ok(PromotionReport { summary, findings })
    }
}
