//! Read-only schema snapshots compared by the parity and compatibility checks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    /// `None` means no default, which differs from an empty-string default
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub charset: String,
    #[serde(default)]
    pub collation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Primary-key columns in key order
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<Table>,
}

/// Read-only access to a host's schema.
#[async_trait]
pub trait SchemaInspector: Send + Sync {
    async fn schema(&self, host: &str, cancel: &CancellationToken) -> anyhow::Result<Schema>;
}
