//! Severity-ranked findings and their aggregation.
//!
//! Every check, step and orchestrator reports what it observed as a list of
//! [`Finding`]s. Callers fold those into a [`Summary`]; a single
//! [`Severity::Block`] anywhere means "do not proceed".

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};

/// Free-form key/value context attached to a finding.
pub type Meta = BTreeMap<String, Value>;

/// How serious a finding is. Ordered `Info < Warn < Block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Block,
}

impl Severity {
    /// Only `Block` halts progression.
    pub fn halts(self) -> bool {
        self == Severity::Block
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Block => "BLOCK",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observation with a severity, a message and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: Meta,
}

impl Finding {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            meta: Meta::new(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, message)
    }

    pub fn block(message: impl Into<String>) -> Self {
        Self::new(Severity::Block, message)
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.meta.insert(key.into(), value);
        self
    }

    /// Attach a metadata entry unless the key is already present.
    pub fn tag(&mut self, key: &str, value: &str) {
        self.meta
            .entry(key.to_string())
            .or_insert_with(|| Value::String(value.to_string()));
    }

    pub fn is_block(&self) -> bool {
        self.severity.halts()
    }

    /// Whether the message carries any explanation.
    pub fn has_message(&self) -> bool {
        !self.message.trim().is_empty()
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// Counts of findings by severity.
///
/// Aggregation is plain addition, so the order in which batches are folded
/// never changes the totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub info: usize,
    pub warn: usize,
    pub block: usize,
}

impl Summary {
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut summary = Summary::default();
        for finding in findings {
            summary.record(finding.severity);
        }
        summary
    }

    /// Count one finding of `severity`.
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Info => self.info += 1,
            Severity::Warn => self.warn += 1,
            Severity::Block => self.block += 1,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.block > 0
    }

    /// No warnings and no blocks.
    pub fn is_clean(&self) -> bool {
        self.warn == 0 && self.block == 0
    }

    pub fn total(&self) -> usize {
        self.info + self.warn + self.block
    }
}

impl Add for Summary {
    type Output = Summary;

    fn add(self, rhs: Summary) -> Summary {
        Summary {
            info: self.info + rhs.info,
            warn: self.warn + rhs.warn,
            block: self.block + rhs.block,
        }
    }
}

impl AddAssign for Summary {
    fn add_assign(&mut self, rhs: Summary) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Summary: {} INFO / {} WARN / {} BLOCK",
            self.info, self.warn, self.block
        )
    }
}

/// Folds finding batches and tracks whether progression may continue.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    summary: Summary,
    blocked: bool,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch. Returns `false` once any `Block` has been seen.
    pub fn add_findings(&mut self, findings: &[Finding]) -> bool {
        for finding in findings {
            self.summary.record(finding.severity);
            if finding.is_block() {
                self.blocked = true;
            }
        }
        !self.blocked
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    pub fn blocked(&self) -> bool {
        self.blocked
    }

    /// Human-readable summary line.
    pub fn summary_line(&self) -> String {
        self.summary.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Block);
        assert!(Severity::Block.halts());
        assert!(!Severity::Warn.halts());
        assert_eq!(Severity::Warn.to_string(), "WARN");
    }

    #[test]
    fn test_finding_serialization() {
        let finding = Finding::block("table \"t\" missing on replica").with_meta("table", "t");
        let value = serde_json::to_value(&finding).unwrap();
        assert_eq!(
            value,
            json!({"severity": "BLOCK", "message": "table \"t\" missing on replica", "meta": {"table": "t"}})
        );

        // Empty meta is omitted
        let value = serde_json::to_value(Finding::info("ok")).unwrap();
        assert_eq!(value, json!({"severity": "INFO", "message": "ok"}));
    }

    #[test]
    fn test_tag_keeps_existing_value() {
        let mut finding = Finding::warn("x").with_meta("check", "original");
        finding.tag("check", "other");
        finding.tag("step", "preflight");
        assert_eq!(finding.meta["check"], json!("original"));
        assert_eq!(finding.meta["step"], json!("preflight"));
    }

    #[test]
    fn test_blank_message_detection() {
        assert!(!Finding::info("  ").has_message());
        assert!(Finding::info("ok").has_message());
    }

    #[test]
    fn test_aggregator_blocks_after_first_block() {
        let mut agg = ResultAggregator::new();
        assert!(agg.add_findings(&[Finding::info("a"), Finding::warn("b")]));
        assert!(!agg.add_findings(&[Finding::block("c")]));
        assert!(!agg.add_findings(&[Finding::info("d")]));
        assert!(agg.blocked());
        assert_eq!(agg.summary_line(), "Summary: 2 INFO / 1 WARN / 1 BLOCK");
    }

    fn severity_strategy() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Info),
            Just(Severity::Warn),
            Just(Severity::Block)
        ]
    }

    proptest! {
        #[test]
        fn prop_summary_order_independent(
            severities in prop::collection::vec(severity_strategy(), 0..64),
            split in 0usize..64,
        ) {
            let findings: Vec<Finding> = severities.iter().map(|s| Finding::new(*s, "m")).collect();
            let whole = Summary::from_findings(&findings);

            let mut reversed = findings.clone();
            reversed.reverse();
            prop_assert_eq!(whole, Summary::from_findings(&reversed));

            let split = split.min(findings.len());
            let (left, right) = findings.split_at(split);
            let a = Summary::from_findings(left);
            let b = Summary::from_findings(right);
            prop_assert_eq!(whole, a + b);
            prop_assert_eq!(a + b, b + a);
            prop_assert_eq!(whole.total(), findings.len());
        }

        #[test]
        fn prop_summary_addition_associative(
            a in (0usize..100, 0usize..100, 0usize..100),
            b in (0usize..100, 0usize..100, 0usize..100),
            c in (0usize..100, 0usize..100, 0usize..100),
        ) {
            let s = |t: (usize, usize, usize)| Summary { info: t.0, warn: t.1, block: t.2 };
            prop_assert_eq!((s(a) + s(b)) + s(c), s(a) + (s(b) + s(c)));
        }
    }
}
