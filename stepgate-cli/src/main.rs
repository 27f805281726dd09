use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use stepgate::config::LoggingConfig;
use stepgate::Config;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod commands;
mod inspectors;

use commands::{ReplicaArgs, Session, SourceArgs};

#[derive(Parser, Debug)]
#[command(name = "stepgate")]
#[command(about = "Gated, checkpointed database major-version migrations")]
#[command(version)]
struct Cli {
    /// Migration plan (YAML)
    #[arg(long, global = true, default_value = "migration.yaml")]
    plan: PathBuf,

    /// Tool configuration (TOML); a missing file means defaults
    #[arg(long, global = true, env = "STEPGATE_CONFIG", default_value = "stepgate.toml")]
    config: PathBuf,

    /// Exit with code 2 when the report contains a BLOCK finding
    #[arg(long, global = true)]
    fail_on_block: bool,

    /// Cancel at the next step boundary after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the migration plan
    Plan,

    /// Run read-only checks before any mutation
    Preflight {
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Upgrade a replica
    Upgrade {
        #[command(subcommand)]
        target: UpgradeTarget,
    },

    /// Compare schemas between the primary and a replica
    Validate {
        #[command(subcommand)]
        target: ValidateTarget,
    },

    /// CDC connector checks
    Cdc {
        #[command(subcommand)]
        command: CdcCommand,
    },

    /// Promotion gate: confirmation plus strict revalidation
    Promote {
        /// Confirmation phrase typed by the operator
        #[arg(long, default_value = "")]
        confirm: String,

        /// Required confirmation phrase (overrides promotion.confirmation_phrase)
        #[arg(long)]
        phrase: Option<String>,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Run every plan step, resuming past completed ones
    Run {
        /// Allow steps that change the topology
        #[arg(long)]
        allow_mutations: bool,

        /// Confirmation phrase for the promote step
        #[arg(long)]
        confirm: Option<String>,

        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        replica: ReplicaArgs,
    },

    /// Inspect checkpoint state
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
}

#[derive(Subcommand, Debug)]
enum UpgradeTarget {
    /// Stop replication, upgrade, start replication
    Replica {
        /// Replica host
        name: String,

        #[command(flatten)]
        replica: ReplicaArgs,
    },
}

#[derive(Subcommand, Debug)]
enum ValidateTarget {
    /// Validate a named replica
    Replica {
        /// Replica host
        name: String,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Validate against the plan's first replica
    Primary {
        #[command(flatten)]
        sources: SourceArgs,
    },
}

#[derive(Subcommand, Debug)]
enum CdcCommand {
    /// Check connector health
    Check {
        #[command(flatten)]
        sources: SourceArgs,
    },
}

#[derive(Subcommand, Debug)]
enum StateCommand {
    /// Print completed steps and checkpoints
    Show {
        /// Checkpoint file (overrides state.path in config)
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Plan => "plan",
            Commands::Preflight { .. } => "preflight",
            Commands::Upgrade { .. } => "upgrade replica",
            Commands::Validate { target: ValidateTarget::Replica { .. } } => "validate replica",
            Commands::Validate { target: ValidateTarget::Primary { .. } } => "validate primary",
            Commands::Cdc { .. } => "cdc check",
            Commands::Promote { .. } => "promote",
            Commands::Run { .. } => "run",
            Commands::State { .. } => "state show",
        }
    }
}

/// Logs go to stderr; stdout carries only the report.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Cancel on Ctrl-C or when the deadline passes.
fn spawn_cancel_watch(cancel: CancellationToken, timeout: Option<Duration>) {
    if timeout.is_some_and(|t| t.is_zero()) {
        tracing::warn!("Deadline already reached, no step will start");
        cancel.cancel();
        return;
    }
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::warn!("Interrupted, stopping at the next step boundary"),
            _ = deadline => tracing::warn!("Deadline reached, stopping at the next step boundary"),
        }
        cancel.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)?;
    init_logging(&config.logging);

    let cancel = CancellationToken::new();
    spawn_cancel_watch(cancel.clone(), cli.timeout_secs.map(Duration::from_secs));

    let run_id = Uuid::new_v4();
    let command = cli.command;
    let span = tracing::info_span!("run", run_id = %run_id, command = command.name());

    let mut session = Session {
        run_id,
        config,
        plan_path: cli.plan,
        cancel,
        fail_on_block: cli.fail_on_block,
    };

    async move {
        match command {
            Commands::Plan => commands::run_plan(&session),
            Commands::Preflight { sources } => commands::run_preflight(&session, &sources).await,
            Commands::Upgrade {
                target: UpgradeTarget::Replica { name, replica },
            } => commands::run_upgrade_replica(&session, &name, &replica).await,
            Commands::Validate {
                target: ValidateTarget::Replica { name, sources },
            } => commands::run_validate_replica(&session, &name, &sources).await,
            Commands::Validate {
                target: ValidateTarget::Primary { sources },
            } => commands::run_validate_primary(&session, &sources).await,
            Commands::Cdc {
                command: CdcCommand::Check { sources },
            } => commands::run_cdc_check(&session, &sources).await,
            Commands::Promote {
                confirm,
                phrase,
                sources,
            } => commands::run_promote(&mut session, &confirm, phrase, &sources).await,
            Commands::Run {
                allow_mutations,
                confirm,
                sources,
                replica,
            } => commands::run_workflow(&session, allow_mutations, confirm.as_deref(), &sources, &replica).await,
            Commands::State {
                command: StateCommand::Show { state },
            } => commands::run_state_show(&session, state.as_deref()),
        }
    }
    .instrument(span)
    .await
}
