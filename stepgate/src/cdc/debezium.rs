//! Debezium connector and task health, including restart-loop detection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::checks::{Check, CheckInput};
use crate::config::CdcCheckConfig;
use crate::finding::Finding;

pub const CHECK_DEBEZIUM_HEALTH: &str = "cdc_debezium_health";
pub const STATE_RUNNING: &str = "RUNNING";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: i64,
    pub state: String,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default)]
    pub trace: String,
}

/// Point-in-time connector status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorStatus {
    #[serde(default)]
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default)]
    pub tasks: Vec<TaskStatus>,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub last_restart_at: Option<DateTime<Utc>>,
}

/// Read-only access to connector status.
#[async_trait]
pub trait DebeziumInspector: Send + Sync {
    async fn connector_status(
        &self,
        connector: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ConnectorStatus>;
}

/// `restart_count >= max` with the most recent restart inside `window`.
pub fn is_restart_loop(status: &ConnectorStatus, now: DateTime<Utc>, window: Duration, max: u32) -> bool {
    let Some(last) = status.last_restart_at else {
        return false;
    };
    if status.restart_count < max {
        return false;
    }
    match chrono::Duration::from_std(window) {
        Ok(window) => now.signed_duration_since(last) <= window,
        Err(_) => true,
    }
}

/// Hours, minutes and seconds with zero inner units kept: `10m0s`, `1h0m0s`.
fn format_window(window: Duration) -> String {
    let secs = window.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Validates connector and task states and flags restart loops.
pub struct DebeziumHealthCheck {
    inspector: Arc<dyn DebeziumInspector>,
    window: Duration,
    max_restarts: u32,
}

impl DebeziumHealthCheck {
    pub fn new(inspector: Arc<dyn DebeziumInspector>) -> Self {
        Self::with_config(inspector, &CdcCheckConfig::default())
    }

    pub fn with_config(inspector: Arc<dyn DebeziumInspector>, config: &CdcCheckConfig) -> Self {
        let defaults = CdcCheckConfig::default();
        let window = match config.restart_loop_window_secs {
            0 => defaults.restart_loop_window(),
            _ => config.restart_loop_window(),
        };
        let max_restarts = match config.restart_loop_max {
            0 => defaults.restart_loop_max,
            n => n,
        };
        Self {
            inspector,
            window,
            max_restarts,
        }
    }

    /// Evaluate a status snapshot. State, task and loop findings are
    /// independent and all reported together.
    pub fn evaluate(&self, status: &ConnectorStatus, now: DateTime<Utc>) -> Vec<Finding> {
        let mut findings = Vec::new();
        let name = status.name.as_str();

        if status.state != STATE_RUNNING {
            findings.push(
                Finding::block(format!(
                    "connector {name:?} is {} (expected RUNNING)",
                    status.state
                ))
                .with_meta("connector", name)
                .with_meta("state", &status.state),
            );
        }

        for task in status.tasks.iter().filter(|t| t.state != STATE_RUNNING) {
            findings.push(
                Finding::block(format!("connector {name:?} task {} is {}", task.id, task.state))
                    .with_meta("connector", name)
                    .with_meta("task_id", task.id)
                    .with_meta("state", &task.state)
                    .with_meta("trace", &task.trace),
            );
        }

        if is_restart_loop(status, now, self.window, self.max_restarts) {
            let window = format_window(self.window);
            findings.push(
                Finding::block(format!(
                    "connector {name:?} appears to be in a restart loop ({} restarts within {window})",
                    status.restart_count
                ))
                .with_meta("connector", name)
                .with_meta("restart_count", status.restart_count)
                .with_meta("window", window),
            );
        }

        if findings.is_empty() {
            findings.push(
                Finding::info(format!("connector {name:?} and tasks are RUNNING"))
                    .with_meta("connector", name),
            );
        }
        findings
    }
}

#[async_trait]
impl Check for DebeziumHealthCheck {
    fn name(&self) -> &str {
        CHECK_DEBEZIUM_HEALTH
    }

    async fn run(&self, input: &CheckInput, cancel: &CancellationToken) -> anyhow::Result<Vec<Finding>> {
        let connector = input.connector.trim();
        if connector.is_empty() {
            anyhow::bail!("connector name is required");
        }

        let mut status = match self.inspector.connector_status(connector, cancel).await {
            Ok(status) => status,
            Err(e) => {
                return Ok(vec![Finding::block(format!(
                    "failed to read Debezium connector status: {e:#}"
                ))
                .with_meta("connector", connector)]);
            }
        };
        if status.name.is_empty() {
            status.name = connector.to_string();
        }

        Ok(self.evaluate(&status, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Severity, Summary};
    use serde_json::json;

    fn running(restarts: u32, last_restart_at: Option<DateTime<Utc>>) -> ConnectorStatus {
        ConnectorStatus {
            name: "orders-connector".to_string(),
            state: STATE_RUNNING.to_string(),
            tasks: vec![TaskStatus {
                id: 0,
                state: STATE_RUNNING.to_string(),
                ..Default::default()
            }],
            restart_count: restarts,
            last_restart_at,
            ..Default::default()
        }
    }

    struct Fixed(anyhow::Result<ConnectorStatus>);

    #[async_trait]
    impl DebeziumInspector for Fixed {
        async fn connector_status(&self, _: &str, _: &CancellationToken) -> anyhow::Result<ConnectorStatus> {
            match &self.0 {
                Ok(status) => Ok(status.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    fn check() -> DebeziumHealthCheck {
        DebeziumHealthCheck::new(Arc::new(Fixed(Ok(ConnectorStatus::default()))))
    }

    #[test]
    fn test_healthy_connector_single_info() {
        let findings = check().evaluate(&running(0, None), Utc::now());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
        assert_eq!(findings[0].message, "connector \"orders-connector\" and tasks are RUNNING");
    }

    #[test]
    fn test_paused_connector_blocks() {
        let mut status = running(0, None);
        status.state = "PAUSED".to_string();
        let findings = check().evaluate(&status, Utc::now());
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is_block());
        assert_eq!(findings[0].message, "connector \"orders-connector\" is PAUSED (expected RUNNING)");
    }

    #[test]
    fn test_each_failed_task_reported_with_trace() {
        let mut status = running(0, None);
        status.tasks = vec![
            TaskStatus { id: 0, state: "FAILED".to_string(), trace: "java.lang.NullPointerException".to_string(), ..Default::default() },
            TaskStatus { id: 1, state: STATE_RUNNING.to_string(), ..Default::default() },
            TaskStatus { id: 2, state: "UNASSIGNED".to_string(), ..Default::default() },
        ];
        let findings = check().evaluate(&status, Utc::now());
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].meta["trace"], json!("java.lang.NullPointerException"));
        assert_eq!(findings[0].meta["task_id"], json!(0));
        assert_eq!(findings[1].meta["task_id"], json!(2));
    }

    #[test]
    fn test_restart_loop_detected() {
        let now = Utc::now();
        let status = running(5, Some(now - chrono::Duration::minutes(2)));
        let findings = check().evaluate(&status, now);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is_block());
        assert_eq!(
            findings[0].message,
            "connector \"orders-connector\" appears to be in a restart loop (5 restarts within 10m0s)"
        );
    }

    #[test]
    fn test_format_window() {
        assert_eq!(format_window(Duration::from_secs(600)), "10m0s");
        assert_eq!(format_window(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_window(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format_window(Duration::from_secs(45)), "45s");
    }

    #[test]
    fn test_restart_loop_boundaries() {
        let now = Utc::now();
        let window = Duration::from_secs(600);

        // Below the restart threshold
        assert!(!is_restart_loop(&running(2, Some(now)), now, window, 3));
        // At the threshold
        assert!(is_restart_loop(&running(3, Some(now)), now, window, 3));
        // Exactly at the window edge
        assert!(is_restart_loop(&running(3, Some(now - chrono::Duration::minutes(10))), now, window, 3));
        // Outside the window
        assert!(!is_restart_loop(&running(9, Some(now - chrono::Duration::minutes(11))), now, window, 3));
        // No timestamp
        assert!(!is_restart_loop(&running(9, None), now, window, 3));
    }

    #[test]
    fn test_findings_not_short_circuited() {
        let now = Utc::now();
        let mut status = running(4, Some(now));
        status.state = "FAILED".to_string();
        status.tasks[0].state = "FAILED".to_string();

        let summary = Summary::from_findings(&check().evaluate(&status, now));
        assert_eq!(summary, Summary { info: 0, warn: 0, block: 3 });
    }

    #[test]
    fn test_zero_config_falls_back_to_defaults() {
        let config = CdcCheckConfig {
            restart_loop_window_secs: 0,
            restart_loop_max: 0,
            schema_history_topic: None,
        };
        let check = DebeziumHealthCheck::with_config(Arc::new(Fixed(Ok(ConnectorStatus::default()))), &config);
        let now = Utc::now();
        assert_eq!(check.evaluate(&running(3, Some(now)), now).len(), 1);
        assert!(check.evaluate(&running(3, Some(now)), now)[0].is_block());
    }

    #[tokio::test]
    async fn test_inspector_error_is_block_finding() {
        let check = DebeziumHealthCheck::new(Arc::new(Fixed(Err(anyhow::anyhow!("connect timeout")))));
        let input = CheckInput { connector: "orders-connector".to_string(), ..Default::default() };

        let findings = check.run(&input, &CancellationToken::new()).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is_block());
        assert_eq!(findings[0].message, "failed to read Debezium connector status: connect timeout");
    }

    #[tokio::test]
    async fn test_missing_name_filled_from_input() {
        let mut status = running(0, None);
        status.name.clear();
        let check = DebeziumHealthCheck::new(Arc::new(Fixed(Ok(status))));
        let input = CheckInput { connector: "orders-connector".to_string(), ..Default::default() };

        let findings = check.run(&input, &CancellationToken::new()).await.unwrap();
        assert_eq!(findings[0].meta["connector"], json!("orders-connector"));
    }
}
