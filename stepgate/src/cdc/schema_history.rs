//! Kafka schema-history topic health and table coverage.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::checks::{Check, CheckInput};
use crate::finding::Finding;

pub const CHECK_SCHEMA_HISTORY: &str = "cdc_schema_history";

/// Read-only access to Kafka topics and schema-history contents.
#[async_trait]
pub trait KafkaInspector: Send + Sync {
    async fn topic_exists(&self, topic: &str, cancel: &CancellationToken) -> anyhow::Result<bool>;
    async fn topic_readable(&self, topic: &str, cancel: &CancellationToken) -> anyhow::Result<bool>;
    /// Tables the schema history records DDL for.
    async fn schema_history_tables(
        &self,
        topic: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<String>>;
}

/// Expected tables absent from `covered`, compared trimmed and
/// case-insensitively. Blank expected entries are ignored.
pub fn missing_tables(expected: &[String], covered: &[String]) -> Vec<String> {
    let covered: HashSet<String> = covered.iter().map(|t| t.trim().to_lowercase()).collect();
    expected
        .iter()
        .filter(|t| {
            let key = t.trim().to_lowercase();
            !key.is_empty() && !covered.contains(&key)
        })
        .cloned()
        .collect()
}

/// Validates that the schema-history topic exists, is readable and covers
/// every expected table.
pub struct SchemaHistoryCheck {
    inspector: Arc<dyn KafkaInspector>,
    topic: String,
    expected_tables: Vec<String>,
}

impl SchemaHistoryCheck {
    pub fn new(
        inspector: Arc<dyn KafkaInspector>,
        topic: impl Into<String>,
        expected_tables: Vec<String>,
    ) -> Self {
        Self {
            inspector,
            topic: topic.into(),
            expected_tables,
        }
    }

    fn block(&self, message: String) -> Vec<Finding> {
        vec![Finding::block(message).with_meta("topic", &self.topic)]
    }
}

#[async_trait]
impl Check for SchemaHistoryCheck {
    fn name(&self) -> &str {
        CHECK_SCHEMA_HISTORY
    }

    async fn run(&self, _input: &CheckInput, cancel: &CancellationToken) -> anyhow::Result<Vec<Finding>> {
        let topic = self.topic.as_str();
        if topic.trim().is_empty() {
            anyhow::bail!("schema history topic is required");
        }

        match self.inspector.topic_exists(topic, cancel).await {
            Err(e) => return Ok(self.block(format!("failed to check schema history topic {topic:?}: {e:#}"))),
            Ok(false) => return Ok(self.block(format!("schema history topic {topic:?} is missing"))),
            Ok(true) => {}
        }

        match self.inspector.topic_readable(topic, cancel).await {
            Err(e) => return Ok(self.block(format!("failed to read schema history topic {topic:?}: {e:#}"))),
            Ok(false) => return Ok(self.block(format!("schema history topic {topic:?} is not readable"))),
            Ok(true) => {}
        }

        let covered = match self.inspector.schema_history_tables(topic, cancel).await {
            Ok(tables) => tables,
            Err(e) => {
                return Ok(self.block(format!(
                    "failed to read schema history coverage for {topic:?}: {e:#}"
                )))
            }
        };

        let missing = missing_tables(&self.expected_tables, &covered);
        if !missing.is_empty() {
            return Ok(vec![Finding::block(format!(
                "schema history missing tables: {}",
                missing.join(", ")
            ))
            .with_meta("topic", topic)
            .with_meta("missing_tables", &missing)]);
        }

        Ok(vec![
            Finding::info(format!("schema history topic {topic:?} is healthy")).with_meta("topic", topic)
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct FakeKafka {
        exists: Option<bool>,
        readable: Option<bool>,
        tables: Option<Vec<String>>,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl KafkaInspector for FakeKafka {
        async fn topic_exists(&self, _: &str, _: &CancellationToken) -> anyhow::Result<bool> {
            self.calls.lock().push("exists");
            self.exists.ok_or_else(|| anyhow::anyhow!("broker unavailable"))
        }

        async fn topic_readable(&self, _: &str, _: &CancellationToken) -> anyhow::Result<bool> {
            self.calls.lock().push("readable");
            self.readable.ok_or_else(|| anyhow::anyhow!("not authorized"))
        }

        async fn schema_history_tables(&self, _: &str, _: &CancellationToken) -> anyhow::Result<Vec<String>> {
            self.calls.lock().push("tables");
            self.tables.clone().ok_or_else(|| anyhow::anyhow!("decode failed"))
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    async fn run(kafka: Arc<FakeKafka>, expected: &[&str]) -> Vec<Finding> {
        SchemaHistoryCheck::new(kafka, "schema-changes.orders", strings(expected))
            .run(&CheckInput::default(), &CancellationToken::new())
            .await
            .unwrap()
    }

    #[test]
    fn test_missing_tables_normalization() {
        let missing = missing_tables(
            &strings(&[" Orders ", "customers", "", "audit"]),
            &strings(&["orders", " CUSTOMERS"]),
        );
        assert_eq!(missing, strings(&["audit"]));
        assert!(missing_tables(&[], &strings(&["orders"])).is_empty());
    }

    #[tokio::test]
    async fn test_missing_topic_short_circuits() {
        let kafka = Arc::new(FakeKafka { exists: Some(false), ..Default::default() });
        let findings = run(kafka.clone(), &["orders"]).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "schema history topic \"schema-changes.orders\" is missing");
        assert_eq!(*kafka.calls.lock(), vec!["exists"]);
    }

    #[tokio::test]
    async fn test_exists_error_short_circuits() {
        let kafka = Arc::new(FakeKafka::default());
        let findings = run(kafka.clone(), &["orders"]).await;
        assert!(findings[0].is_block());
        assert!(findings[0].message.ends_with("broker unavailable"));
        assert_eq!(kafka.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_topic_short_circuits() {
        let kafka = Arc::new(FakeKafka { exists: Some(true), readable: Some(false), ..Default::default() });
        let findings = run(kafka.clone(), &["orders"]).await;
        assert_eq!(findings[0].message, "schema history topic \"schema-changes.orders\" is not readable");
        assert_eq!(*kafka.calls.lock(), vec!["exists", "readable"]);
    }

    #[tokio::test]
    async fn test_coverage_error_blocks() {
        let kafka = Arc::new(FakeKafka { exists: Some(true), readable: Some(true), ..Default::default() });
        let findings = run(kafka, &["orders"]).await;
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.starts_with("failed to read schema history coverage"));
    }

    #[tokio::test]
    async fn test_missing_tables_block_lists_all() {
        let kafka = Arc::new(FakeKafka {
            exists: Some(true),
            readable: Some(true),
            tables: Some(strings(&["orders"])),
            ..Default::default()
        });
        let findings = run(kafka, &["orders", "customers", "audit"]).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "schema history missing tables: customers, audit");
        assert_eq!(findings[0].meta["missing_tables"], json!(["customers", "audit"]));
    }

    #[tokio::test]
    async fn test_full_coverage_is_info() {
        let kafka = Arc::new(FakeKafka {
            exists: Some(true),
            readable: Some(true),
            tables: Some(strings(&["ORDERS", "customers"])),
            ..Default::default()
        });
        let findings = run(kafka, &["orders"]).await;
        assert_eq!(findings.len(), 1);
        assert!(!findings[0].is_block());
        assert_eq!(findings[0].message, "schema history topic \"schema-changes.orders\" is healthy");
    }
}
