//! File- and REST-backed adapters for the engine's inspector and action traits.
//!
//! Snapshots are JSON files captured from the live systems ahead of time, which
//! lets every command run against a fixed picture of the topology.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use stepgate::cdc::{ConnectorStatus, DebeziumInspector, KafkaInspector, TaskStatus};
use stepgate::checks::MySqlInspector;
use stepgate::replica::{ReplicaActions, ReplicaInspector, ReplicationStatus};
use stepgate::schema::{Schema, SchemaInspector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const ACTIONS_NOT_CONFIGURED: &str = "replica actions not configured; use --simulate or provide implementation";

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {:?}", path))
}

/// Primary host reads one schema file, every other host reads the replica file.
pub struct SchemaFileInspector {
    primary_host: String,
    primary_path: Option<PathBuf>,
    replica_path: Option<PathBuf>,
}

impl SchemaFileInspector {
    pub fn new(primary_host: impl Into<String>, primary_path: Option<PathBuf>, replica_path: Option<PathBuf>) -> Self {
        Self {
            primary_host: primary_host.into(),
            primary_path,
            replica_path,
        }
    }

    fn path_for(&self, host: &str) -> Option<&Path> {
        if host == self.primary_host {
            self.primary_path.as_deref()
        } else {
            self.replica_path.as_deref()
        }
    }
}

#[async_trait]
impl SchemaInspector for SchemaFileInspector {
    async fn schema(&self, host: &str, _cancel: &CancellationToken) -> Result<Schema> {
        if host.is_empty() {
            anyhow::bail!("host is required");
        }
        let path = self
            .path_for(host)
            .with_context(|| format!("schema file path required for host {host:?}"))?;
        debug!(host, path = ?path, "Reading schema snapshot");
        read_json(path).await
    }
}

/// Connector status captured as JSON.
pub struct DebeziumFileInspector {
    path: Option<PathBuf>,
}

impl DebeziumFileInspector {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl DebeziumInspector for DebeziumFileInspector {
    async fn connector_status(&self, connector: &str, _cancel: &CancellationToken) -> Result<ConnectorStatus> {
        let path = self.path.as_deref().context("cdc status file path is required")?;
        let mut status: ConnectorStatus = read_json(path).await?;
        if status.name.is_empty() {
            status.name = connector.to_string();
        }
        Ok(status)
    }
}

#[derive(Debug, Deserialize)]
struct RestConnectorStatus {
    #[serde(default)]
    name: String,
    connector: RestConnectorState,
    #[serde(default)]
    tasks: Vec<TaskStatus>,
}

#[derive(Debug, Deserialize)]
struct RestConnectorState {
    state: String,
    #[serde(default)]
    worker_id: String,
}

/// Live status from the Kafka Connect REST API.
///
/// The API does not expose restart history, so restart-loop detection never
/// fires for this source.
pub struct DebeziumRestInspector {
    client: reqwest::Client,
    base_url: String,
}

impl DebeziumRestInspector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `{base}/connectors/{name}/status` with the name percent-encoded as one segment.
    pub fn status_url(&self, connector: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid Kafka Connect URL {:?}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Kafka Connect URL {:?} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(["connectors", connector, "status"]);
        Ok(url)
    }
}

#[async_trait]
impl DebeziumInspector for DebeziumRestInspector {
    async fn connector_status(&self, connector: &str, cancel: &CancellationToken) -> Result<ConnectorStatus> {
        let url = self.status_url(connector)?;
        debug!(url = %url, "Fetching connector status");

        let resp = tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("connector status request cancelled"),
            resp = self.client.get(url).send() => resp
                .with_context(|| format!("Failed to connect to Kafka Connect at {}", self.base_url))?,
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Kafka Connect returned {}: {}", status, body);
        }

        let body: RestConnectorStatus = resp.json().await.context("Failed to decode connector status")?;
        Ok(ConnectorStatus {
            name: if body.name.is_empty() { connector.to_string() } else { body.name },
            state: body.connector.state,
            worker_id: body.connector.worker_id,
            tasks: body.tasks,
            ..Default::default()
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct SchemaHistorySnapshot {
    #[serde(default)]
    topics: BTreeMap<String, TopicSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
struct TopicSnapshot {
    #[serde(default)]
    readable: bool,
    #[serde(default)]
    tables: Vec<String>,
}

/// Schema history topics captured as `{"topics": {name: {readable, tables}}}`.
pub struct SchemaHistoryFileInspector {
    path: PathBuf,
}

impl SchemaHistoryFileInspector {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn snapshot(&self) -> Result<SchemaHistorySnapshot> {
        read_json(&self.path).await
    }
}

#[async_trait]
impl KafkaInspector for SchemaHistoryFileInspector {
    async fn topic_exists(&self, topic: &str, _cancel: &CancellationToken) -> Result<bool> {
        Ok(self.snapshot().await?.topics.contains_key(topic))
    }

    async fn topic_readable(&self, topic: &str, _cancel: &CancellationToken) -> Result<bool> {
        Ok(self.snapshot().await?.topics.get(topic).is_some_and(|t| t.readable))
    }

    async fn schema_history_tables(&self, topic: &str, _cancel: &CancellationToken) -> Result<Vec<String>> {
        self.snapshot()
            .await?
            .topics
            .remove(topic)
            .map(|t| t.tables)
            .with_context(|| format!("topic {topic:?} not found in snapshot"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServerFacts {
    #[serde(default)]
    sql_mode: String,
    #[serde(default)]
    deprecated_features: Vec<String>,
}

/// Server settings captured as `{"sql_mode": "...", "deprecated_features": [...]}`.
pub struct ServerFactsFileInspector {
    path: PathBuf,
}

impl ServerFactsFileInspector {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl MySqlInspector for ServerFactsFileInspector {
    async fn sql_mode(&self, _host: &str, _cancel: &CancellationToken) -> Result<String> {
        let facts: ServerFacts = read_json(&self.path).await?;
        Ok(facts.sql_mode)
    }

    async fn deprecated_features_used(&self, _host: &str, _cancel: &CancellationToken) -> Result<Vec<String>> {
        let facts: ServerFacts = read_json(&self.path).await?;
        Ok(facts.deprecated_features)
    }
}

/// Replication state supplied on the command line.
pub struct StaticReplicaInspector {
    primary: String,
    status: ReplicationStatus,
}

impl StaticReplicaInspector {
    pub fn new(primary: impl Into<String>, status: ReplicationStatus) -> Self {
        Self {
            primary: primary.into(),
            status,
        }
    }
}

#[async_trait]
impl ReplicaInspector for StaticReplicaInspector {
    async fn is_primary(&self, host: &str, _cancel: &CancellationToken) -> Result<bool> {
        Ok(host == self.primary)
    }

    async fn replication_status(&self, _replica: &str, _cancel: &CancellationToken) -> Result<ReplicationStatus> {
        Ok(self.status)
    }
}

/// Succeeds without touching any server.
pub struct SimulatedActions;

#[async_trait]
impl ReplicaActions for SimulatedActions {
    async fn stop_replication(&self, replica: &str, _cancel: &CancellationToken) -> Result<()> {
        info!(replica, "Simulated: stop replication");
        Ok(())
    }

    async fn run_upgrade(&self, replica: &str, _cancel: &CancellationToken) -> Result<()> {
        info!(replica, "Simulated: run upgrade");
        Ok(())
    }

    async fn start_replication(&self, replica: &str, _cancel: &CancellationToken) -> Result<()> {
        info!(replica, "Simulated: start replication");
        Ok(())
    }
}

/// Refuses every action.
pub struct UnconfiguredActions;

#[async_trait]
impl ReplicaActions for UnconfiguredActions {
    async fn stop_replication(&self, _replica: &str, _cancel: &CancellationToken) -> Result<()> {
        anyhow::bail!(ACTIONS_NOT_CONFIGURED)
    }

    async fn run_upgrade(&self, _replica: &str, _cancel: &CancellationToken) -> Result<()> {
        anyhow::bail!(ACTIONS_NOT_CONFIGURED)
    }

    async fn start_replication(&self, _replica: &str, _cancel: &CancellationToken) -> Result<()> {
        anyhow::bail!(ACTIONS_NOT_CONFIGURED)
    }
}
