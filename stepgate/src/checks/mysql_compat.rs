//! MySQL 5.7 to 8.0 compatibility signals on the primary.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{Check, CheckInput};
use crate::config::CompatConfig;
use crate::finding::Finding;
use crate::schema::SchemaInspector;

pub const CHECK_MYSQL_COMPAT: &str = "mysql_compat_57_80";

/// Read-only access to server settings.
#[async_trait]
pub trait MySqlInspector: Send + Sync {
    /// Raw `@@sql_mode` value (comma separated).
    async fn sql_mode(&self, host: &str, cancel: &CancellationToken) -> anyhow::Result<String>;

    /// Deprecated features the server reports as in use.
    async fn deprecated_features_used(
        &self,
        host: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<String>>;
}

/// Flags settings and schema features that break or degrade on 8.0.
pub struct MySqlCompatCheck {
    inspector: Arc<dyn MySqlInspector>,
    schema: Arc<dyn SchemaInspector>,
    rules: CompatConfig,
}

impl MySqlCompatCheck {
    pub fn new(
        inspector: Arc<dyn MySqlInspector>,
        schema: Arc<dyn SchemaInspector>,
        rules: CompatConfig,
    ) -> Self {
        Self {
            inspector,
            schema,
            rules,
        }
    }
}

fn upper_set<'a>(values: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
    values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_uppercase)
        .collect()
}

fn contains_insensitive(list: &[String], value: &str) -> bool {
    !value.is_empty() && list.iter().any(|item| item.eq_ignore_ascii_case(value))
}

#[async_trait]
impl Check for MySqlCompatCheck {
    fn name(&self) -> &str {
        CHECK_MYSQL_COMPAT
    }

    async fn run(&self, input: &CheckInput, cancel: &CancellationToken) -> anyhow::Result<Vec<Finding>> {
        let host = input.primary_host.trim();
        if host.is_empty() {
            anyhow::bail!("primary host is required");
        }

        let mut findings = Vec::new();

        let versions_set = !input.source_version.is_empty() || !input.target_version.is_empty();
        if versions_set && (input.source_version != "5.7" || input.target_version != "8.0") {
            findings.push(
                Finding::warn("compatibility check tuned for 5.7 → 8.0 upgrades")
                    .with_meta("source_version", &input.source_version)
                    .with_meta("target_version", &input.target_version),
            );
        }

        let sql_mode = self
            .inspector
            .sql_mode(host, cancel)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read sql_mode: {e:#}"))?;
        let modes = upper_set(sql_mode.split(','));
        for mode in &self.rules.deprecated_sql_modes {
            if modes.contains(&mode.to_uppercase()) {
                findings.push(
                    Finding::warn(format!("sql_mode includes deprecated mode {mode:?} for 8.0"))
                        .with_meta("mode", mode),
                );
            }
        }

        let used = self
            .inspector
            .deprecated_features_used(host, cancel)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read deprecated features: {e:#}"))?;
        let used = upper_set(used.iter().map(String::as_str));
        for feature in &self.rules.deprecated_features {
            if used.contains(&feature.to_uppercase()) {
                findings.push(
                    Finding::block(format!("deprecated feature detected: {feature:?}"))
                        .with_meta("feature", feature),
                );
            }
        }

        let schema = self
            .schema
            .schema(host, cancel)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read schema: {e:#}"))?;
        for table in &schema.tables {
            if table.primary_key.is_empty() {
                findings.push(
                    Finding::block(format!("table {:?} missing primary key (CDC risk)", table.name))
                        .with_meta("table", &table.name),
                );
            }
            for col in &table.columns {
                if contains_insensitive(&self.rules.risky_charsets, &col.charset) {
                    findings.push(
                        Finding::warn(format!(
                            "table {:?} column {:?} uses risky charset {:?}",
                            table.name, col.name, col.charset
                        ))
                        .with_meta("table", &table.name)
                        .with_meta("column", &col.name)
                        .with_meta("charset", &col.charset),
                    );
                }
                if contains_insensitive(&self.rules.risky_collations, &col.collation) {
                    findings.push(
                        Finding::warn(format!(
                            "table {:?} column {:?} uses risky collation {:?}",
                            table.name, col.name, col.collation
                        ))
                        .with_meta("table", &table.name)
                        .with_meta("column", &col.name)
                        .with_meta("collation", &col.collation),
                    );
                }
            }
        }

        if findings.is_empty() {
            findings.push(Finding::info("no MySQL 5.7 → 8.0 compatibility risks detected"));
        }
        Ok(findings)
    }
}
