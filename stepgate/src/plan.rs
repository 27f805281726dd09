//! Declarative migration plan model, validation and loading.
//!
//! A plan names the topology being migrated, the CDC connector that must stay
//! healthy, and which workflow steps to run. Steps may be omitted but never
//! reordered or repeated relative to [`StepKind::CANONICAL`].

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A supported workflow step, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepKind {
    Preflight,
    UpgradeReplica,
    ValidateReplica,
    CdcCheck,
    Promote,
    PostValidation,
}

impl StepKind {
    pub const CANONICAL: [StepKind; 6] = [
        StepKind::Preflight,
        StepKind::UpgradeReplica,
        StepKind::ValidateReplica,
        StepKind::CdcCheck,
        StepKind::Promote,
        StepKind::PostValidation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Preflight => "preflight",
            StepKind::UpgradeReplica => "upgrade_replica",
            StepKind::ValidateReplica => "validate_replica",
            StepKind::CdcCheck => "cdc_check",
            StepKind::Promote => "promote",
            StepKind::PostValidation => "post_validation",
        }
    }

    /// Position in the canonical order.
    pub fn position(self) -> usize {
        self as usize
    }

    /// Steps that change the target systems.
    pub fn mutates(self) -> bool {
        matches!(self, StepKind::UpgradeReplica | StepKind::Promote)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        StepKind::CANONICAL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unsupported step {s:?}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub primary: String,
    #[serde(default)]
    pub replicas: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CdcConfig {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub connector: String,
}

/// Declarative migration plan.
///
/// ```yaml
/// migration: orders-57-to-80
/// source_version: "5.7"
/// target_version: "8.0"
/// topology:
///   primary: db-primary
///   replicas: [db-replica-1, db-replica-2]
/// cdc:
///   type: debezium
///   connector: orders-connector
/// steps: [preflight, upgrade_replica, validate_replica, cdc_check, promote]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    #[serde(default)]
    pub migration: String,
    #[serde(default, deserialize_with = "version_string")]
    pub source_version: String,
    #[serde(default, deserialize_with = "version_string")]
    pub target_version: String,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub cdc: CdcConfig,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Accepts unquoted versions (`5.10`) and keeps the scalar's source text.
///
/// Going through a YAML number would turn `5.10` into `5.1`.
fn version_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct VersionVisitor;

    impl Visitor<'_> for VersionVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a version such as \"8.0\"")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<String, E> {
            Ok(String::new())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_str(VersionVisitor)
}

impl MigrationPlan {
    /// Check required fields, step names and step order.
    ///
    /// Every problem found is reported, not just the first.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let required = [
            ("migration", &self.migration),
            ("source_version", &self.source_version),
            ("target_version", &self.target_version),
            ("topology.primary", &self.topology.primary),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                problems.push(format!("{field} is required"));
            }
        }

        if self.topology.replicas.is_empty() {
            problems.push("topology.replicas must include at least one replica".to_string());
        }
        for (i, replica) in self.topology.replicas.iter().enumerate() {
            if replica.trim().is_empty() {
                problems.push(format!("topology.replicas[{i}] is empty"));
            }
        }

        if self.cdc.kind.trim().is_empty() {
            problems.push("cdc.type is required".to_string());
        }
        if self.cdc.connector.trim().is_empty() {
            problems.push("cdc.connector is required".to_string());
        }

        if self.steps.is_empty() {
            problems.push("steps must include at least one step".to_string());
        }
        let mut seen = HashSet::new();
        let mut last_position = None;
        for (i, raw) in self.steps.iter().enumerate() {
            let name = raw.trim();
            if name.is_empty() {
                problems.push(format!("steps[{i}] is empty"));
                continue;
            }
            let Ok(kind) = name.parse::<StepKind>() else {
                problems.push(format!("steps[{i}]={name:?} is not supported"));
                continue;
            };
            if seen.contains(&kind) {
                problems.push(format!("steps[{i}]={name:?} is duplicated"));
                continue;
            }
            if last_position.is_some_and(|last| kind.position() < last) {
                problems.push(format!("step order invalid at steps[{i}]={name:?}"));
                continue;
            }
            seen.insert(kind);
            last_position = Some(kind.position());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidPlan(problems))
        }
    }

    /// Parsed step kinds in plan order. Only meaningful on a validated plan.
    pub fn step_kinds(&self) -> Vec<StepKind> {
        self.steps
            .iter()
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }

    /// Default replica target for commands that act on one replica.
    pub fn first_replica(&self) -> Result<&str> {
        self.topology
            .replicas
            .first()
            .map(String::as_str)
            .ok_or_else(|| Error::Config("no replicas defined in plan".to_string()))
    }
}

/// Read, decode and validate a YAML plan.
pub fn load_plan(path: impl AsRef<Path>) -> Result<MigrationPlan> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(Error::Config("plan path is required".to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let plan: MigrationPlan = serde_yaml::from_str(&content)?;
    plan.validate()?;
    tracing::debug!(migration = %plan.migration, steps = plan.steps.len(), "Loaded plan");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_plan() -> MigrationPlan {
        MigrationPlan {
            migration: "orders".to_string(),
            source_version: "5.7".to_string(),
            target_version: "8.0".to_string(),
            topology: Topology {
                primary: "db-primary".to_string(),
                replicas: vec!["db-replica-1".to_string()],
            },
            cdc: CdcConfig {
                kind: "debezium".to_string(),
                connector: "orders-connector".to_string(),
            },
            steps: vec!["preflight".to_string(), "promote".to_string()],
        }
    }

    fn problems(plan: &MigrationPlan) -> Vec<String> {
        match plan.validate() {
            Err(Error::InvalidPlan(problems)) => problems,
            other => panic!("expected InvalidPlan, got {other:?}"),
        }
    }

    #[test]
    fn test_unquoted_versions() {
        let plan: MigrationPlan =
            serde_yaml::from_str("migration: m\nsource_version: 5.7\ntarget_version: \"8.0\"\n").unwrap();
        assert_eq!(plan.source_version, "5.7");
        assert_eq!(plan.target_version, "8.0");
    }

    #[test]
    fn test_unquoted_versions_keep_trailing_zeros() {
        let plan: MigrationPlan =
            serde_yaml::from_str("migration: m\nsource_version: 5.10\ntarget_version: 10.10\n").unwrap();
        assert_eq!(plan.source_version, "5.10");
        assert_eq!(plan.target_version, "10.10");

        let plan: MigrationPlan =
            serde_yaml::from_str("source_version: 8.0.36\ntarget_version: 8\n").unwrap();
        assert_eq!(plan.source_version, "8.0.36");
        assert_eq!(plan.target_version, "8");
    }

    #[test]
    fn test_empty_version_is_reported() {
        let plan: MigrationPlan = serde_yaml::from_str("source_version:\n").unwrap();
        assert_eq!(plan.source_version, "");
        assert!(problems(&plan).contains(&"source_version is required".to_string()));
    }

    #[test]
    fn test_valid_plan() {
        valid_plan().validate().unwrap();
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let plan = MigrationPlan::default();
        let problems = problems(&plan);
        assert!(problems.contains(&"migration is required".to_string()));
        assert!(problems.contains(&"topology.replicas must include at least one replica".to_string()));
        assert!(problems.contains(&"cdc.connector is required".to_string()));
        assert!(problems.contains(&"steps must include at least one step".to_string()));
    }

    #[test]
    fn test_blank_fields_rejected() {
        let mut plan = valid_plan();
        plan.source_version = "   ".to_string();
        plan.topology.replicas.push(" ".to_string());
        assert_eq!(
            problems(&plan),
            vec![
                "source_version is required".to_string(),
                "topology.replicas[1] is empty".to_string()
            ]
        );
    }

    #[test]
    fn test_unknown_step_rejected() {
        let mut plan = valid_plan();
        plan.steps = vec!["preflight".to_string(), "drop_database".to_string()];
        assert_eq!(
            problems(&plan),
            vec!["steps[1]=\"drop_database\" is not supported".to_string()]
        );
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let mut plan = valid_plan();
        plan.steps = vec!["preflight".to_string(), "preflight".to_string()];
        assert_eq!(
            problems(&plan),
            vec!["steps[1]=\"preflight\" is duplicated".to_string()]
        );
    }

    #[test]
    fn test_reordered_steps_rejected() {
        let mut plan = valid_plan();
        plan.steps = vec!["promote".to_string(), "preflight".to_string()];
        assert_eq!(
            problems(&plan),
            vec!["step order invalid at steps[1]=\"preflight\"".to_string()]
        );
    }

    #[test]
    fn test_error_message_joins_problems() {
        let mut plan = valid_plan();
        plan.migration.clear();
        plan.cdc.kind.clear();
        let err = plan.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "migration plan validation failed: migration is required; cdc.type is required"
        );
    }

    #[test]
    fn test_step_kinds_and_mutation() {
        let plan = valid_plan();
        assert_eq!(plan.step_kinds(), vec![StepKind::Preflight, StepKind::Promote]);
        assert!(StepKind::Promote.mutates());
        assert!(StepKind::UpgradeReplica.mutates());
        assert!(!StepKind::CdcCheck.mutates());
    }

    #[test]
    fn test_load_plan_from_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("migration.yaml");
        std::fs::write(
            &path,
            r#"
migration: orders
source_version: "5.7"
target_version: "8.0"
topology:
  primary: db-primary
  replicas: [db-replica-1, db-replica-2]
cdc:
  type: debezium
  connector: orders-connector
steps: [preflight, upgrade_replica, cdc_check]
"#,
        )
        .unwrap();

        let plan = load_plan(&path).unwrap();
        assert_eq!(plan.first_replica().unwrap(), "db-replica-1");
        assert_eq!(plan.cdc.kind, "debezium");
        assert_eq!(plan.topology.primary, "db-primary");
    }

    #[test]
    fn test_load_plan_errors() {
        assert!(matches!(load_plan(""), Err(Error::Config(_))));

        let temp = TempDir::new().unwrap();
        assert!(matches!(load_plan(temp.path().join("missing.yaml")), Err(Error::Io(_))));

        let path = temp.path().join("bad.yaml");
        std::fs::write(&path, "steps: [preflight\n").unwrap();
        assert!(matches!(load_plan(&path), Err(Error::Yaml(_))));
    }
}
