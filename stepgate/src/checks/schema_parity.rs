//! Structural diff between a primary and a replica schema snapshot.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{Check, CheckInput};
use crate::finding::Finding;
use crate::schema::{Column, Schema, SchemaInspector, Table};

pub const CHECK_SCHEMA_PARITY: &str = "schema_parity";

/// Compare `primary` against `replica`.
///
/// Returns an empty list when the schemas match. Tables and columns are
/// visited in name order so the output is stable between runs.
pub fn compare_schemas(primary: &Schema, replica: &Schema) -> Vec<Finding> {
    let primary_tables = index_tables(&primary.tables);
    let replica_tables = index_tables(&replica.tables);
    let mut findings = Vec::new();

    for (name, p_table) in &primary_tables {
        let Some(r_table) = replica_tables.get(name) else {
            findings.push(
                Finding::block(format!("table {name:?} missing on replica")).with_meta("table", name),
            );
            continue;
        };
        findings.extend(compare_primary_key(name, &p_table.primary_key, &r_table.primary_key));
        findings.extend(compare_columns(name, &p_table.columns, &r_table.columns));
    }

    for name in replica_tables.keys() {
        if !primary_tables.contains_key(name) {
            findings.push(
                Finding::warn(format!("extra table {name:?} exists on replica")).with_meta("table", name),
            );
        }
    }

    findings
}

fn index_tables(tables: &[Table]) -> BTreeMap<&str, &Table> {
    tables.iter().map(|t| (t.name.as_str(), t)).collect()
}

fn index_columns(columns: &[Column]) -> BTreeMap<&str, &Column> {
    columns.iter().map(|c| (c.name.as_str(), c)).collect()
}

fn compare_primary_key(table: &str, primary: &[String], replica: &[String]) -> Option<Finding> {
    match (primary.is_empty(), replica.is_empty()) {
        (true, true) => None,
        (true, false) => Some(
            Finding::warn(format!("table {table:?} has primary key on replica but not on primary"))
                .with_meta("table", table),
        ),
        (false, true) => Some(
            Finding::block(format!("table {table:?} missing primary key on replica"))
                .with_meta("table", table),
        ),
        (false, false) if primary != replica => Some(
            Finding::block(format!("table {table:?} primary key mismatch"))
                .with_meta("table", table)
                .with_meta("primary_pk", primary)
                .with_meta("replica_pk", replica),
        ),
        (false, false) => None,
    }
}

fn compare_columns(table: &str, primary: &[Column], replica: &[Column]) -> Vec<Finding> {
    let primary_cols = index_columns(primary);
    let replica_cols = index_columns(replica);
    let mut findings = Vec::new();

    for (name, p) in &primary_cols {
        let Some(r) = replica_cols.get(name) else {
            findings.push(
                Finding::block(format!("table {table:?} column {name:?} missing on replica"))
                    .with_meta("table", table)
                    .with_meta("column", name),
            );
            continue;
        };

        if p.data_type != r.data_type {
            findings.push(
                Finding::block(format!("table {table:?} column {name:?} type mismatch"))
                    .with_meta("table", table)
                    .with_meta("column", name)
                    .with_meta("primary_type", &p.data_type)
                    .with_meta("replica_type", &r.data_type),
            );
        }
        if p.nullable != r.nullable {
            findings.push(
                Finding::warn(format!("table {table:?} column {name:?} nullability differs"))
                    .with_meta("table", table)
                    .with_meta("column", name)
                    .with_meta("primary_nullable", p.nullable)
                    .with_meta("replica_nullable", r.nullable),
            );
        }
        if p.default != r.default {
            findings.push(
                Finding::warn(format!("table {table:?} column {name:?} default differs"))
                    .with_meta("table", table)
                    .with_meta("column", name)
                    .with_meta("primary_default", &p.default)
                    .with_meta("replica_default", &r.default),
            );
        }
        if p.collation != r.collation {
            findings.push(
                Finding::warn(format!("table {table:?} column {name:?} collation differs"))
                    .with_meta("table", table)
                    .with_meta("column", name)
                    .with_meta("primary_collation", &p.collation)
                    .with_meta("replica_collation", &r.collation),
            );
        }
    }

    for name in replica_cols.keys() {
        if !primary_cols.contains_key(name) {
            findings.push(
                Finding::warn(format!("table {table:?} has extra column {name:?} on replica"))
                    .with_meta("table", table)
                    .with_meta("column", name),
            );
        }
    }

    findings
}

/// Reads both snapshots through a [`SchemaInspector`] and diffs them.
pub struct SchemaParityCheck {
    inspector: Arc<dyn SchemaInspector>,
}

impl SchemaParityCheck {
    pub fn new(inspector: Arc<dyn SchemaInspector>) -> Self {
        Self { inspector }
    }
}

#[async_trait]
impl Check for SchemaParityCheck {
    fn name(&self) -> &str {
        CHECK_SCHEMA_PARITY
    }

    async fn run(&self, input: &CheckInput, cancel: &CancellationToken) -> anyhow::Result<Vec<Finding>> {
        if input.primary_host.trim().is_empty() || input.replica_host.trim().is_empty() {
            anyhow::bail!("primary and replica hosts are required");
        }

        let primary = self
            .inspector
            .schema(&input.primary_host, cancel)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read primary schema: {e:#}"))?;
        let replica = self
            .inspector
            .schema(&input.replica_host, cancel)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read replica schema: {e:#}"))?;

        let mut findings = compare_schemas(&primary, &replica);
        if findings.is_empty() {
            findings.push(
                Finding::info("schema parity verified")
                    .with_meta("primary", &input.primary_host)
                    .with_meta("replica", &input.replica_host)
                    .with_meta("tables", primary.tables.len()),
            );
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Severity, Summary};
    use serde_json::json;
    use std::collections::HashMap;

    fn column(name: &str, data_type: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: false,
            default: None,
            charset: "utf8mb4".to_string(),
            collation: "utf8mb4_0900_ai_ci".to_string(),
        }
    }

    fn table(name: &str, pk: &[&str], columns: Vec<Column>) -> Table {
        Table {
            name: name.to_string(),
            primary_key: pk.iter().map(|s| s.to_string()).collect(),
            columns,
        }
    }

    fn schema(tables: Vec<Table>) -> Schema {
        Schema { tables }
    }

    #[test]
    fn test_identical_schemas_produce_nothing() {
        let s = schema(vec![table("t", &["id"], vec![column("id", "int")])]);
        assert!(compare_schemas(&s, &s.clone()).is_empty());
    }

    #[test]
    fn test_missing_and_extra_tables() {
        let primary = schema(vec![table("orders", &[], vec![])]);
        let replica = schema(vec![table("audit", &[], vec![])]);

        let findings = compare_schemas(&primary, &replica);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::Block);
        assert_eq!(findings[0].message, "table \"orders\" missing on replica");
        assert_eq!(findings[1].severity, Severity::Warn);
        assert_eq!(findings[1].message, "extra table \"audit\" exists on replica");
    }

    #[test]
    fn test_primary_key_rules() {
        let cols = vec![column("id", "int")];

        // Primary has a key, replica does not
        let findings = compare_schemas(
            &schema(vec![table("t", &["id"], cols.clone())]),
            &schema(vec![table("t", &[], cols.clone())]),
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Block);

        // Replica has a key, primary does not
        let findings = compare_schemas(
            &schema(vec![table("t", &[], cols.clone())]),
            &schema(vec![table("t", &["id"], cols.clone())]),
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warn);

        // Order matters
        let two = vec![column("a", "int"), column("b", "int")];
        let findings = compare_schemas(
            &schema(vec![table("t", &["a", "b"], two.clone())]),
            &schema(vec![table("t", &["b", "a"], two)]),
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "table \"t\" primary key mismatch");
        assert_eq!(findings[0].meta["replica_pk"], json!(["b", "a"]));
    }

    #[test]
    fn test_column_type_mismatch_blocks() {
        let findings = compare_schemas(
            &schema(vec![table("t", &["id"], vec![column("id", "int")])]),
            &schema(vec![table("t", &["id"], vec![column("id", "bigint")])]),
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Block);
        assert_eq!(findings[0].meta["primary_type"], json!("int"));
        assert_eq!(findings[0].meta["replica_type"], json!("bigint"));
    }

    #[test]
    fn test_nullability_only_warns() {
        let mut nullable = column("name", "varchar(64)");
        nullable.nullable = true;

        let findings = compare_schemas(
            &schema(vec![table("t", &[], vec![column("name", "varchar(64)")])]),
            &schema(vec![table("t", &[], vec![nullable])]),
        );
        let summary = Summary::from_findings(&findings);
        assert_eq!(summary, Summary { info: 0, warn: 1, block: 0 });
    }

    #[test]
    fn test_each_attribute_difference_reported() {
        let mut replica_col = column("status", "varchar(16)");
        replica_col.nullable = true;
        replica_col.default = Some("new".to_string());
        replica_col.collation = "utf8mb4_general_ci".to_string();

        let findings = compare_schemas(
            &schema(vec![table("t", &[], vec![column("status", "varchar(16)")])]),
            &schema(vec![table("t", &[], vec![replica_col])]),
        );
        let messages: Vec<&str> = findings.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "table \"t\" column \"status\" nullability differs",
                "table \"t\" column \"status\" default differs",
                "table \"t\" column \"status\" collation differs",
            ]
        );
        assert!(findings.iter().all(|f| f.severity == Severity::Warn));
    }

    #[test]
    fn test_empty_default_differs_from_none() {
        let mut replica_col = column("note", "text");
        replica_col.default = Some(String::new());

        let findings = compare_schemas(
            &schema(vec![table("t", &[], vec![column("note", "text")])]),
            &schema(vec![table("t", &[], vec![replica_col])]),
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].meta["primary_default"], json!(null));
        assert_eq!(findings[0].meta["replica_default"], json!(""));
    }

    #[test]
    fn test_missing_and_extra_columns() {
        let findings = compare_schemas(
            &schema(vec![table("t", &[], vec![column("a", "int"), column("b", "int")])]),
            &schema(vec![table("t", &[], vec![column("a", "int"), column("c", "int")])]),
        );
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].message, "table \"t\" column \"b\" missing on replica");
        assert!(findings[0].is_block());
        assert_eq!(findings[1].message, "table \"t\" has extra column \"c\" on replica");
        assert_eq!(findings[1].severity, Severity::Warn);
    }

    struct MapInspector(HashMap<String, Schema>);

    #[async_trait]
    impl SchemaInspector for MapInspector {
        async fn schema(&self, host: &str, _: &CancellationToken) -> anyhow::Result<Schema> {
            self.0
                .get(host)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown host {host}"))
        }
    }

    fn input(primary: &str, replica: &str) -> CheckInput {
        CheckInput {
            primary_host: primary.to_string(),
            replica_host: replica.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_check_synthesizes_info_when_clean() {
        let s = schema(vec![table("t", &["id"], vec![column("id", "int")])]);
        let inspector = MapInspector(HashMap::from([
            ("p".to_string(), s.clone()),
            ("r".to_string(), s),
        ]));
        let check = SchemaParityCheck::new(Arc::new(inspector));

        let findings = check.run(&input("p", "r"), &CancellationToken::new()).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
        assert_eq!(findings[0].message, "schema parity verified");
    }

    #[tokio::test]
    async fn test_check_read_failure_is_error() {
        let inspector = MapInspector(HashMap::from([("p".to_string(), Schema::default())]));
        let check = SchemaParityCheck::new(Arc::new(inspector));

        let err = check
            .run(&input("p", "r"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to read replica schema"));

        let err = check
            .run(&input("p", ""), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "primary and replica hosts are required");
    }
}
