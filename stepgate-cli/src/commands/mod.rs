pub mod cdc;
pub mod plan;
pub mod preflight;
pub mod promote;
pub mod run;
pub mod state;
pub mod upgrade;
pub mod validate;

pub use cdc::run_cdc_check;
pub use plan::run_plan;
pub use preflight::run_preflight;
pub use promote::run_promote;
pub use run::run_workflow;
pub use state::run_state_show;
pub use upgrade::run_upgrade_replica;
pub use validate::{run_validate_primary, run_validate_replica};

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use stepgate::cdc::{DebeziumInspector, KafkaInspector};
use stepgate::checks::MySqlInspector;
use stepgate::replica::{ReplicaActions, ReplicationStatus};
use stepgate::state::{CheckpointStore, FileStore};
use stepgate::{Collaborators, Config, MigrationPlan, Pipeline, Report};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::inspectors::{
    DebeziumFileInspector, DebeziumRestInspector, SchemaFileInspector, SchemaHistoryFileInspector,
    ServerFactsFileInspector, SimulatedActions, StaticReplicaInspector, UnconfiguredActions,
};

/// Exit code when `--fail-on-block` is set and the report blocks.
const EXIT_BLOCKED: u8 = 2;

/// Exit code when a run stopped on Ctrl-C or `--timeout-secs`.
const EXIT_CANCELLED: u8 = 130;

/// Where read-only observations come from.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Primary schema snapshot (JSON)
    #[arg(long)]
    pub schema_primary: Option<PathBuf>,

    /// Replica schema snapshot (JSON)
    #[arg(long)]
    pub schema_replica: Option<PathBuf>,

    /// Debezium connector status snapshot (JSON)
    #[arg(long)]
    pub cdc_status: Option<PathBuf>,

    /// Kafka Connect REST URL; takes precedence over --cdc-status
    #[arg(long, env = "STEPGATE_CONNECT_URL")]
    pub cdc_url: Option<String>,

    /// Schema history topic snapshot (JSON); requires cdc.schema_history_topic in config
    #[arg(long)]
    pub schema_history: Option<PathBuf>,

    /// Tables the schema history must cover (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub expected_tables: Vec<String>,

    /// Server facts snapshot (JSON) enabling the MySQL compatibility check
    #[arg(long)]
    pub server_facts: Option<PathBuf>,
}

/// How replica upgrades observe and act.
#[derive(Args, Debug, Clone)]
pub struct ReplicaArgs {
    /// Checkpoint file (overrides state.path in config)
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Simulate replica actions without touching MySQL
    #[arg(long)]
    pub simulate: bool,

    /// Replica IO thread running
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub io_running: bool,

    /// Replica SQL thread running
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub sql_running: bool,
}

impl Default for ReplicaArgs {
    fn default() -> Self {
        Self {
            state: None,
            simulate: false,
            io_running: true,
            sql_running: true,
        }
    }
}

/// Everything one invocation shares across commands.
pub struct Session {
    pub run_id: Uuid,
    pub config: Config,
    pub plan_path: PathBuf,
    pub cancel: CancellationToken,
    pub fail_on_block: bool,
}

impl Session {
    pub fn load_plan(&self) -> Result<MigrationPlan> {
        stepgate::load_plan(&self.plan_path)
            .with_context(|| format!("Failed to load plan {:?}", self.plan_path))
    }

    /// Build the pipeline for `plan` with file- or REST-backed collaborators.
    pub fn pipeline(
        &self,
        plan: MigrationPlan,
        sources: &SourceArgs,
        replica: &ReplicaArgs,
        confirmation: Option<&str>,
    ) -> Pipeline {
        let collaborators = collaborators(&plan, sources, replica);
        let mut builder = Pipeline::builder(plan, self.config.clone(), collaborators)
            .expected_tables(sources.expected_tables.clone());
        if let Some(phrase) = confirmation {
            builder = builder.confirmation(phrase);
        }
        builder.build()
    }

    /// Open the file-backed checkpoint store.
    pub fn open_state(&self, path: Option<&Path>) -> Result<Arc<dyn CheckpointStore>> {
        let path = path.unwrap_or(self.config.state.path.as_path());
        let store = FileStore::open(path).with_context(|| format!("Failed to open state file {:?}", path))?;
        Ok(Arc::new(store))
    }

    /// Print the report to stdout and pick the exit code.
    pub fn emit(&self, report: &Report) -> Result<ExitCode> {
        println!("{}", report.to_json_pretty()?);
        if report.is_cancelled() {
            return Ok(ExitCode::from(EXIT_CANCELLED));
        }
        if self.fail_on_block && report.is_blocked() {
            return Ok(ExitCode::from(EXIT_BLOCKED));
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn collaborators(plan: &MigrationPlan, sources: &SourceArgs, replica: &ReplicaArgs) -> Collaborators {
    let primary = plan.topology.primary.clone();

    let debezium: Arc<dyn DebeziumInspector> = match &sources.cdc_url {
        Some(url) => Arc::new(DebeziumRestInspector::new(url.as_str())),
        None => Arc::new(DebeziumFileInspector::new(sources.cdc_status.clone())),
    };

    let actions: Arc<dyn ReplicaActions> = if replica.simulate {
        Arc::new(SimulatedActions)
    } else {
        Arc::new(UnconfiguredActions)
    };

    let kafka = sources
        .schema_history
        .clone()
        .map(|path| Arc::new(SchemaHistoryFileInspector::new(path)) as Arc<dyn KafkaInspector>);
    let mysql = sources
        .server_facts
        .clone()
        .map(|path| Arc::new(ServerFactsFileInspector::new(path)) as Arc<dyn MySqlInspector>);

    Collaborators {
        schema: Arc::new(SchemaFileInspector::new(
            primary.clone(),
            sources.schema_primary.clone(),
            sources.schema_replica.clone(),
        )),
        debezium,
        replica_inspector: Arc::new(StaticReplicaInspector::new(
            primary,
            ReplicationStatus {
                io_thread_running: replica.io_running,
                sql_thread_running: replica.sql_running,
            },
        )),
        replica_actions: actions,
        kafka,
        mysql,
    }
}
