//! The JSON document every command prints.

use serde::Serialize;
use uuid::Uuid;

use crate::checks::{flatten_results, CheckResult};
use crate::error::Result;
use crate::finding::{Finding, Summary};
use crate::workflow::{Outcome, WorkflowReport};

/// Summary and findings of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub run_id: Uuid,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    pub summary: Summary,
    pub findings: Vec<Finding>,
}

impl Report {
    pub fn new(run_id: Uuid, command: impl Into<String>, summary: Summary, findings: Vec<Finding>) -> Self {
        Self {
            run_id,
            command: command.into(),
            outcome: None,
            summary,
            findings,
        }
    }

    /// Summary computed from the findings themselves.
    pub fn from_findings(run_id: Uuid, command: impl Into<String>, findings: Vec<Finding>) -> Self {
        let summary = Summary::from_findings(&findings);
        Self::new(run_id, command, summary, findings)
    }

    /// Flattened check results, each finding tagged with its check.
    pub fn from_check_results(
        run_id: Uuid,
        command: impl Into<String>,
        summary: Summary,
        results: &[CheckResult],
    ) -> Self {
        Self::new(run_id, command, summary, flatten_results(results))
    }

    /// Workflow results, each finding tagged with its step.
    pub fn from_workflow(run_id: Uuid, command: impl Into<String>, workflow: &WorkflowReport) -> Self {
        let mut report = Self::new(run_id, command, workflow.summary, workflow.findings());
        report.outcome = Some(workflow.outcome.clone());
        report
    }

    pub fn is_blocked(&self) -> bool {
        self.summary.is_blocked()
    }

    /// Whether a workflow stopped on cancellation before finishing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Some(Outcome::Cancelled { .. }))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepRecord;
    use serde_json::{json, Value};

    #[test]
    fn test_report_json_shape() {
        let report = Report::from_findings(
            Uuid::nil(),
            "cdc check",
            vec![Finding::block("connector \"c\" is PAUSED (expected RUNNING)").with_meta("connector", "c")],
        );
        let value: Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(value["summary"], json!({"info": 0, "warn": 0, "block": 1}));
        assert_eq!(value["findings"][0]["severity"], json!("BLOCK"));
        assert_eq!(value["command"], json!("cdc check"));
        assert!(value.get("outcome").is_none());
        assert!(report.is_blocked());
    }

    #[test]
    fn test_from_workflow_keeps_outcome_and_tags_steps() {
        let workflow = WorkflowReport {
            summary: Summary { info: 1, warn: 0, block: 0 },
            outcome: Outcome::Completed,
            results: vec![StepRecord {
                step: "preflight".to_string(),
                findings: vec![Finding::info("ok")],
            }],
        };
        let report = Report::from_workflow(Uuid::nil(), "run", &workflow);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"], json!({"status": "completed"}));
        assert_eq!(value["findings"][0]["meta"]["step"], json!("preflight"));
        assert!(!report.is_cancelled());
    }

    #[test]
    fn test_cancelled_workflow() {
        let workflow = WorkflowReport {
            summary: Summary::default(),
            outcome: Outcome::Cancelled { step: "promote".to_string() },
            results: Vec::new(),
        };
        let report = Report::from_workflow(Uuid::nil(), "run", &workflow);
        assert!(report.is_cancelled());
        assert!(!report.is_blocked());
        assert!(!Report::from_findings(Uuid::nil(), "plan", Vec::new()).is_cancelled());
    }
}
